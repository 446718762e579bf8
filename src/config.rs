//! Validated journal configuration. Generalizes the teacher's `LogConfig`
//! (which only covered segment size/count and the log directory) to every
//! option named in the journal's external interface.
use crate::errors::ConfigError;
use crate::ConfigResult;
use std::path::PathBuf;
use std::time::Duration;

/// Default sparse-index density: one entry roughly every 4 KiB of data.
pub const DEFAULT_INDEX_INTERVAL_BYTES: u64 = 4096;
/// Default hard cap on an index file's size.
pub const DEFAULT_MAX_INDEX_SIZE_BYTES: u64 = 1024 * 1024;
/// Default grace period before an unlinked-but-pending segment file is
/// actually removed from disk.
pub const DEFAULT_FILE_DELETE_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding segment, index, checkpoint, and sidecar files.
    pub journal_directory: PathBuf,

    /// Soft cap on a segment's data file size before it is rolled.
    pub segment_bytes: u64,
    /// Soft cap on a segment's wall-clock age before it is rolled.
    pub segment_age: Duration,
    /// Sparse-index density: approx. bytes between index entries.
    pub index_interval_bytes: u64,
    /// Hard cap on an index file's size; reaching it forces a roll.
    pub max_index_size_bytes: u64,

    /// Force an fsync once this many messages are unflushed.
    pub flush_interval_messages: u64,
    /// Force an fsync once a log has been dirty at least this long.
    pub flush_age: Duration,

    /// Size-based retention cap; negative (represented as `None`) disables
    /// the size-retention pass.
    pub retention_bytes: Option<u64>,
    /// Age-based retention cap.
    pub retention_age: Duration,

    /// How often the dirty-log flusher checks for work.
    pub flush_check_interval: Duration,
    /// How often the recovery-checkpoint writer runs.
    pub flush_checkpoint_interval: Duration,
    /// How often the retention sweep runs.
    pub retention_check_interval: Duration,
    /// How often the committed-offset sidecar is persisted.
    pub commit_persist_interval: Duration,

    /// Grace period between marking a segment for deletion and unlinking it.
    pub file_delete_delay: Duration,

    /// Maximum total bytes returned by a single `Journal::read` call.
    pub max_read_bytes: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            journal_directory: PathBuf::from("data"),
            segment_bytes: 1024 * 1024,
            segment_age: Duration::from_secs(7 * 24 * 3600),
            index_interval_bytes: DEFAULT_INDEX_INTERVAL_BYTES,
            max_index_size_bytes: DEFAULT_MAX_INDEX_SIZE_BYTES,
            flush_interval_messages: 1,
            flush_age: Duration::from_secs(10 * 60),
            retention_bytes: None,
            retention_age: Duration::from_secs(7 * 24 * 3600),
            flush_check_interval: Duration::from_secs(5),
            flush_checkpoint_interval: Duration::from_secs(60),
            retention_check_interval: Duration::from_secs(30),
            commit_persist_interval: Duration::from_secs(1),
            file_delete_delay: DEFAULT_FILE_DELETE_DELAY,
            max_read_bytes: 5 * 1024 * 1024,
        }
    }
}

impl JournalConfig {
    /// Validates the configuration, returning `ConfigInvalid` (per
    /// spec.md's error taxonomy) for anything that would produce an
    /// unusable journal.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.journal_directory.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDirectory);
        }
        if self.segment_bytes == 0 {
            return Err(ConfigError::MustBePositive {
                field: "segment_bytes",
                value: 0,
            });
        }
        if self.index_interval_bytes == 0 {
            return Err(ConfigError::MustBePositive {
                field: "index_interval_bytes",
                value: 0,
            });
        }
        if self.max_index_size_bytes < 16 {
            // 16 bytes is one index entry; anything smaller can never hold one.
            return Err(ConfigError::TooSmall {
                field: "max_index_size_bytes",
                min: 16,
                value: self.max_index_size_bytes,
            });
        }
        if self.flush_interval_messages == 0 {
            return Err(ConfigError::MustBePositive {
                field: "flush_interval_messages",
                value: 0,
            });
        }
        if self.max_read_bytes == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_read_bytes",
                value: 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        JournalConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_segment_bytes() {
        let mut config = JournalConfig::default();
        config.segment_bytes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MustBePositive {
                field: "segment_bytes",
                ..
            })
        ));
    }

    #[test]
    fn rejects_undersized_index() {
        let mut config = JournalConfig::default();
        config.max_index_size_bytes = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall {
                field: "max_index_size_bytes",
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_directory() {
        let mut config = JournalConfig::default();
        config.journal_directory = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyDirectory)));
    }
}

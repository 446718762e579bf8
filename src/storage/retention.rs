//! Enforces retention limits against a `SegmentSet`: age, then total size,
//! then "has everything in this segment already been committed". A segment
//! is only ever deleted if it survives all three checks and it isn't the
//! active segment — at least one segment, the active one, is always kept.
//!
//! Deletion itself is deferred: a segment's files are renamed out of the
//! way immediately, then unlinked only after `file_delete_delay` has
//! elapsed, so an in-flight read against a just-retired segment doesn't
//! race a hard delete.
use crate::clock::Clock;
use crate::config::JournalConfig;
use crate::errors::RetentionError;
use crate::storage::segment::Segment;
use crate::storage::segment_set::SegmentSet;
use crate::storage::traits::{LocalFileSystem, StorageCleanup};
use crate::RetentionResult;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct RetentionReport {
    pub age_removed: usize,
    pub size_removed: usize,
    pub committed_removed: usize,
}

impl RetentionReport {
    pub fn total_removed(&self) -> usize {
        self.age_removed + self.size_removed + self.committed_removed
    }
}

struct PendingDeletion {
    store_path: PathBuf,
    index_path: PathBuf,
    due_millis: i64,
}

pub struct RetentionManager {
    clock: Arc<dyn Clock>,
    cleanup: LocalFileSystem,
    pending: Vec<PendingDeletion>,
}

impl RetentionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cleanup: LocalFileSystem,
            pending: Vec::new(),
        }
    }

    /// Runs one full retention sweep: first unlinks any previously-deferred
    /// deletions whose grace period has elapsed, then applies the three
    /// retention passes in order (age, size, committed offset).
    pub fn sweep(
        &mut self,
        segments: &mut SegmentSet,
        config: &JournalConfig,
        committed_offset: Option<u64>,
    ) -> RetentionResult<RetentionReport> {
        self.unlink_due_deletions()?;

        let mut report = RetentionReport::default();
        let delay_millis = config.file_delete_delay.as_millis() as i64;

        let now = self.clock.now_millis();
        let retention_age_millis = config.retention_age.as_millis() as i64;
        let age_removed = segments.remove_matching(|segment| {
            now.saturating_sub(segment.created_millis()) > retention_age_millis
        });
        report.age_removed = age_removed.len();
        self.defer_deletion(age_removed, delay_millis)?;

        if let Some(cap) = config.retention_bytes {
            let total: u64 = segments.iter().map(|s| s.store_size()).sum();
            if cap > 0 {
                let utilization = total as f64 / cap as f64;
                if utilization >= 0.95 {
                    warn!(
                        total_bytes = total,
                        cap_bytes = cap,
                        utilization,
                        "log size approaching retention cap"
                    );
                }
            }

            let mut running_total = total;
            let size_removed = segments.remove_matching(|segment| {
                if running_total > cap {
                    running_total = running_total.saturating_sub(segment.store_size());
                    true
                } else {
                    false
                }
            });
            report.size_removed = size_removed.len();
            self.defer_deletion(size_removed, delay_millis)?;
        }

        if let Some(committed) = committed_offset {
            let committed_removed =
                segments.remove_matching(|segment| match segment.last_offset() {
                    Some(last) => last < committed,
                    None => false,
                });
            report.committed_removed = committed_removed.len();
            self.defer_deletion(committed_removed, delay_millis)?;
        }

        if report.total_removed() > 0 {
            info!(
                age_removed = report.age_removed,
                size_removed = report.size_removed,
                committed_removed = report.committed_removed,
                "retention sweep removed segments"
            );
        }

        Ok(report)
    }

    fn defer_deletion(&mut self, segments: Vec<Segment>, delay_millis: i64) -> RetentionResult<()> {
        let due_millis = self.clock.now_millis() + delay_millis;
        for segment in segments {
            let store_path = PathBuf::from(segment.store_path());
            let index_path = PathBuf::from(segment.index_path());

            let store_deleted = Self::mark_for_deletion(&store_path)?;
            let index_deleted = Self::mark_for_deletion(&index_path)?;

            self.pending.push(PendingDeletion {
                store_path: store_deleted,
                index_path: index_deleted,
                due_millis,
            });
        }
        Ok(())
    }

    fn mark_for_deletion(path: &std::path::Path) -> RetentionResult<PathBuf> {
        let deleted_path = path.with_extension(format!(
            "{}.deleted",
            path.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        std::fs::rename(path, &deleted_path).map_err(|source| RetentionError::RenameFailed {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        Ok(deleted_path)
    }

    fn unlink_due_deletions(&mut self) -> RetentionResult<()> {
        let now = self.clock.now_millis();
        let (due, not_due): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_millis <= now);
        self.pending = not_due;

        for entry in due {
            self.cleanup
                .delete_file(&entry.store_path)
                .map_err(|source| RetentionError::UnlinkFailed {
                    path: entry.store_path.to_string_lossy().to_string(),
                    source,
                })?;
            self.cleanup
                .delete_file(&entry.index_path)
                .map_err(|source| RetentionError::UnlinkFailed {
                    path: entry.index_path.to_string_lossy().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DEFAULT_INDEX_INTERVAL_BYTES, DEFAULT_MAX_INDEX_SIZE_BYTES};
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_segment(dir: &TempDir, base_offset: u64, clock: Arc<dyn Clock>) -> Segment {
        Segment::new(
            dir.path().join(format!("{base_offset}.log")),
            dir.path().join(format!("{base_offset}.idx")),
            base_offset,
            1024 * 1024,
            DEFAULT_MAX_INDEX_SIZE_BYTES,
            DEFAULT_INDEX_INTERVAL_BYTES,
            clock,
        )
        .unwrap()
    }

    #[test]
    fn never_removes_the_last_remaining_segment() {
        let dir = TempDir::new().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let mut segments = SegmentSet::new();
        segments.push(make_segment(&dir, 0, clock.clone()));

        let mut manager = RetentionManager::new(clock);
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.retention_age = Duration::from_secs(0);

        let report = manager.sweep(&mut segments, &config, None).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn age_pass_removes_old_non_active_segments() {
        let dir = TempDir::new().unwrap();
        let manual = Arc::new(ManualClock::new(0));
        let clock: Arc<dyn Clock> = manual.clone();

        let mut segments = SegmentSet::new();
        segments.push(make_segment(&dir, 0, clock.clone()));
        manual.advance(Duration::from_secs(3600).as_millis() as i64);
        segments.push(make_segment(&dir, 10, clock.clone()));

        let mut manager = RetentionManager::new(clock);
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.retention_age = Duration::from_secs(1800);

        let report = manager.sweep(&mut segments, &config, None).unwrap();
        assert_eq!(report.age_removed, 1);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments.active().unwrap().base_offset(), 10);
    }

    #[test]
    fn committed_offset_pass_keeps_unconsumed_segments() {
        let dir = TempDir::new().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));

        let mut segments = SegmentSet::new();
        let mut first = make_segment(&dir, 0, clock.clone());
        first.append(&[(None, b"a".to_vec())]).unwrap();
        segments.push(first);
        segments.push(make_segment(&dir, 1, clock.clone()));

        let mut manager = RetentionManager::new(clock);
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.retention_age = Duration::from_secs(365 * 24 * 3600);

        // Nothing committed yet: nothing eligible.
        let report = manager.sweep(&mut segments, &config, None).unwrap();
        assert_eq!(report.committed_removed, 0);

        // Offset 0 has been fully consumed: its segment becomes eligible.
        let report = manager.sweep(&mut segments, &config, Some(1)).unwrap();
        assert_eq!(report.committed_removed, 1);
        assert_eq!(segments.len(), 1);
    }
}

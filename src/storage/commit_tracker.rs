//! Tracks the single committed-read-offset cursor exposed by the journal.
//! There are no consumer groups; one monotonic offset is all a single
//! reader needs. Persisted as a decimal ASCII sidecar file so it survives
//! restarts without depending on the segment recovery scan.
use crate::storage::StorageContext;
use crate::StorageResult;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

/// Sentinel meaning "nothing has ever been committed".
const NEVER_COMMITTED: i64 = i64::MIN;
const CAS_WARN_THRESHOLD: u32 = 10;

pub struct CommitTracker {
    committed_offset: AtomicI64,
    sidecar_path: PathBuf,
}

impl CommitTracker {
    /// Loads the last persisted commit offset from `sidecar_path`, if any.
    pub fn new(sidecar_path: impl AsRef<Path>) -> StorageResult<Self> {
        let sidecar_path = sidecar_path.as_ref().to_path_buf();
        let committed_offset = match fs::read_to_string(&sidecar_path) {
            Ok(contents) => contents.trim().parse::<i64>().unwrap_or(NEVER_COMMITTED),
            Err(_) => NEVER_COMMITTED,
        };

        debug!(
            path = ?sidecar_path,
            committed_offset,
            "commit tracker initialized"
        );

        Ok(Self {
            committed_offset: AtomicI64::new(committed_offset),
            sidecar_path,
        })
    }

    /// Returns the committed offset, or `None` if nothing has been
    /// committed yet.
    pub fn committed_offset(&self) -> Option<u64> {
        let value = self.committed_offset.load(Ordering::Acquire);
        if value == NEVER_COMMITTED {
            None
        } else {
            Some(value as u64)
        }
    }

    /// Advances the committed offset to `offset`, but only if it is greater
    /// than the current value — commits are monotonic. Uses a compare-and-
    /// swap loop since multiple callers may race to mark progress.
    pub fn mark_committed(&self, offset: u64) {
        let candidate = offset as i64;
        let mut current = self.committed_offset.load(Ordering::Acquire);
        let mut attempts = 0u32;

        loop {
            if current >= candidate {
                return;
            }
            match self.committed_offset.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => {
                    current = observed;
                    attempts += 1;
                    if attempts % CAS_WARN_THRESHOLD == 0 {
                        warn!(attempts, offset, "commit offset CAS retrying repeatedly");
                    }
                }
            }
        }
    }

    /// Persists the current committed offset to the sidecar file, flushed
    /// and fsynced. A no-op while the tracker is still at the
    /// never-committed sentinel -- there is nothing durable to record yet.
    pub fn persist(&self) -> StorageResult<()> {
        let value = self.committed_offset.load(Ordering::Acquire);
        if value == NEVER_COMMITTED {
            return Ok(());
        }

        let mut file = fs::File::create(&self.sidecar_path)
            .with_open_context(&self.sidecar_path.to_string_lossy())?;
        file.write_all(value.to_string().as_bytes())
            .with_write_context(value as u64)?;
        file.sync_all()
            .with_sync_context(&self.sidecar_path.to_string_lossy())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn starts_uncommitted_without_a_sidecar() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::new(dir.path().join("commit")).unwrap();
        assert_eq!(tracker.committed_offset(), None);
    }

    #[test]
    fn mark_committed_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::new(dir.path().join("commit")).unwrap();

        tracker.mark_committed(5);
        assert_eq!(tracker.committed_offset(), Some(5));

        tracker.mark_committed(2);
        assert_eq!(tracker.committed_offset(), Some(5), "commits never move backwards");

        tracker.mark_committed(9);
        assert_eq!(tracker.committed_offset(), Some(9));
    }

    #[test]
    fn persist_before_any_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("commit");
        let tracker = CommitTracker::new(&sidecar).unwrap();

        tracker.persist().unwrap();
        assert!(!sidecar.exists(), "nothing durable to record yet at the sentinel");
    }

    #[test]
    fn persists_and_reloads_across_restart() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("commit");

        {
            let tracker = CommitTracker::new(&sidecar).unwrap();
            tracker.mark_committed(42);
            tracker.persist().unwrap();
        }

        let tracker = CommitTracker::new(&sidecar).unwrap();
        assert_eq!(tracker.committed_offset(), Some(42));
    }
}

//! The public façade over the storage engine. `Journal` owns the `Log`,
//! the `CommitTracker`, and the background `Scheduler`, and is the single
//! type application code (the gRPC service, `main.rs`) talks to.
use crate::clock::Clock;
use crate::config::JournalConfig;
use crate::metrics::JournalMetrics;
use crate::scheduler::Scheduler;
use crate::storage::commit_tracker::CommitTracker;
use crate::storage::log::Log;
use crate::storage::record::Record;
use crate::storage::segment::PendingEntry;
use crate::errors::JournalError;
use crate::JournalResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// An unassigned `(key, payload)` pair, ready to be handed to `write`.
/// Spec.md §4.G's `Entry`; `PendingEntry` is the same shape used
/// internally once it reaches `Log`/`Segment`.
pub type Entry = PendingEntry;

/// A snapshot published by the journal for an external backpressure
/// decider to consume; the journal itself never reads this back to alter
/// its own behavior (spec.md §3, §4.G).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThrottleState {
    pub uncommitted_messages: u64,
    pub oldest_segment_millis: Option<i64>,
    pub utilization_percent: f64,
}

pub struct Journal {
    log: Arc<Mutex<Log>>,
    commit_tracker: Arc<CommitTracker>,
    metrics: Arc<JournalMetrics>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Scheduler>,
    next_read_offset: AtomicU64,
    max_read_bytes: u64,
    retention_bytes: Option<u64>,
    throttle_state: Mutex<ThrottleState>,
}

impl Journal {
    /// Opens (or creates) a journal at `config.journal_directory`. Segment
    /// recovery runs synchronously inside `Log::new`; background jobs are
    /// not started until `start` is called.
    pub fn open(config: JournalConfig, clock: Arc<dyn Clock>) -> JournalResult<Self> {
        config.validate()?;

        let commit_sidecar = config
            .journal_directory
            .join("graylog2-committed-read-offset");
        let max_read_bytes = config.max_read_bytes;
        let retention_bytes = config.retention_bytes;
        let log = Log::new(config, clock.clone())?;
        let commit_tracker = CommitTracker::new(commit_sidecar)?;

        // spec.md §4.D: on startup, nextReadOffset = committedOffset + 1
        // (or 0 if nothing has ever been committed).
        let next_read_offset = commit_tracker
            .committed_offset()
            .map(|o| o + 1)
            .unwrap_or(0);

        Ok(Journal {
            log: Arc::new(Mutex::new(log)),
            commit_tracker: Arc::new(commit_tracker),
            metrics: Arc::new(JournalMetrics::new()),
            clock,
            scheduler: None,
            next_read_offset: AtomicU64::new(next_read_offset),
            max_read_bytes,
            retention_bytes,
            throttle_state: Mutex::new(ThrottleState::default()),
        })
    }

    /// Pairs a key and payload into an `Entry`, spec.md §4.G's
    /// `createEntry`. Does not assign an offset; that happens in `write`.
    pub fn create_entry(key: Option<Vec<u8>>, payload: Vec<u8>) -> Entry {
        (key, payload)
    }

    pub fn metrics(&self) -> Arc<JournalMetrics> {
        self.metrics.clone()
    }

    /// Starts the background flush/checkpoint/retention/commit-persist
    /// jobs. Idempotent only in the sense that calling it twice leaks the
    /// first scheduler's handles; callers should call this once.
    pub fn start(&mut self, config: JournalConfig) {
        let scheduler = Scheduler::start(
            self.log.clone(),
            self.commit_tracker.clone(),
            self.metrics.clone(),
            config,
            self.clock.clone(),
        );
        self.scheduler = Some(scheduler);
    }

    /// Stops the background jobs, waiting for their current tick to finish.
    pub async fn shutdown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
    }

    /// Appends a batch of `(key, payload)` entries, returning the assigned
    /// `(first_offset, last_offset)` range.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn write(&self, entries: &[PendingEntry]) -> JournalResult<(u64, u64)> {
        let start = self.clock.now_nanos();
        let mut log = self.lock_log()?;
        let result = log.append(entries)?;
        let elapsed = (self.clock.now_nanos() - start).max(0) as u64;

        self.metrics
            .record_write(entries.len() as u64, elapsed);
        self.record_log_gauges(&log);
        self.publish_throttle_state(&log);

        Ok(result)
    }

    /// Refreshes every gauge derived from the log's own state (as opposed
    /// to the counters `record_write`/`record_read` accumulate). Called
    /// after every write and flush so the published snapshot never goes
    /// stale between scheduler ticks.
    fn record_log_gauges(&self, log: &Log) {
        self.metrics
            .log_end_offset
            .store(log.next_offset() as i64, Ordering::Relaxed);
        self.metrics
            .number_of_segments
            .store(log.segment_count() as u64, Ordering::Relaxed);
        self.metrics
            .unflushed_messages
            .store(log.unflushed_messages(), Ordering::Relaxed);
        self.metrics
            .size_bytes
            .store(log.total_size(), Ordering::Relaxed);
        self.metrics
            .recovery_point
            .store(log.recovery_point() as i64, Ordering::Relaxed);
        if let Some(oldest) = log.oldest_segment_millis() {
            self.metrics
                .oldest_segment_millis
                .store(oldest, Ordering::Relaxed);
        }
    }

    /// `write(key, payload) → lastOffset`, spec.md §4.G's single-entry
    /// overload over `write`.
    pub fn write_one(&self, key: Option<Vec<u8>>, payload: Vec<u8>) -> JournalResult<u64> {
        let (_, last) = self.write(&[(key, payload)])?;
        Ok(last)
    }

    /// `read(fromOffset, maxCount) → records`, spec.md §4.G: at most
    /// `max(1, max_count)` records, capped at the configured
    /// `max_read_bytes` (5 MiB by default). Advances the internal read
    /// cursor to the offset after the last record returned, same as the
    /// cursor-based `read_next`.
    #[instrument(skip(self), fields(from_offset, max_count))]
    pub fn read_from(&self, from_offset: u64, max_count: u64) -> JournalResult<Vec<Record>> {
        let count = max_count.max(1);
        let upper_bound = from_offset.saturating_add(count);
        let records = self.read(from_offset, self.max_read_bytes, Some(upper_bound))?;
        if let Some(last) = records.last() {
            self.next_read_offset
                .store(last.offset + 1, Ordering::Release);
        }
        Ok(records)
    }

    /// `read(maxCount) → records`, spec.md §4.G: reads from the internal
    /// `nextReadOffset` cursor rather than a caller-supplied offset.
    pub fn read_next(&self, max_count: u64) -> JournalResult<Vec<Record>> {
        let from_offset = self.next_read_offset.load(Ordering::Acquire);
        self.read_from(from_offset, max_count)
    }

    /// `getNextReadOffset`: the offset the next cursor-based `read_next`
    /// call will start from.
    pub fn next_read_offset(&self) -> u64 {
        self.next_read_offset.load(Ordering::Acquire)
    }

    /// Returns the latest published throttle-state snapshot. The journal
    /// never consults this itself; it exists purely for an external
    /// backpressure decider to read (spec.md §3).
    pub fn throttle_state(&self) -> ThrottleState {
        *self.throttle_state.lock().expect("throttle state mutex poisoned")
    }

    /// Overwrites the published throttle-state snapshot.
    pub fn set_throttle_state(&self, state: ThrottleState) {
        *self.throttle_state.lock().expect("throttle state mutex poisoned") = state;
    }

    /// Recomputes and publishes a fresh throttle-state snapshot from the
    /// journal's current metrics and log state. Called after every write
    /// and commit so `throttle_state()` stays current without requiring
    /// the caller to poll the log directly.
    fn publish_throttle_state(&self, log: &Log) {
        let uncommitted = self
            .commit_tracker
            .committed_offset()
            .and_then(|committed| log.latest_offset().map(|latest| latest.saturating_sub(committed)))
            .unwrap_or_else(|| log.latest_offset().map(|l| l + 1).unwrap_or(0));
        let utilization_percent = match self.retention_bytes {
            Some(cap) if cap > 0 => 100.0 * log.total_size() as f64 / cap as f64,
            _ => 0.0,
        };
        self.set_throttle_state(ThrottleState {
            uncommitted_messages: uncommitted,
            oldest_segment_millis: log.oldest_segment_millis(),
            utilization_percent,
        });
    }

    /// Reads records starting at `offset`, bounded by `max_bytes` (falling
    /// back to the configured default) and an optional exclusive upper
    /// offset bound. If `offset` has fallen behind `logStartOffset` because
    /// retention already reclaimed it, logs a warning and silently clamps
    /// the read up to the new start rather than failing the caller.
    #[instrument(skip(self), fields(offset))]
    pub fn read(
        &self,
        offset: u64,
        max_bytes: u64,
        upper_bound_offset: Option<u64>,
    ) -> JournalResult<Vec<Record>> {
        let start = self.clock.now_nanos();
        let log = self.lock_log()?;

        let records = match log.read(offset, max_bytes, upper_bound_offset) {
            Err(crate::errors::LogError::OffsetOutOfRange {
                offset,
                log_start_offset,
            }) => {
                tracing::warn!(
                    offset,
                    log_start_offset,
                    "read offset fell behind log start, clamping"
                );
                log.read(log_start_offset, max_bytes, upper_bound_offset)?
            }
            other => other?,
        };
        let elapsed = (self.clock.now_nanos() - start).max(0) as u64;

        self.metrics.record_read(records.len() as u64, elapsed);
        Ok(records)
    }

    /// Advances the committed-read-offset cursor. Monotonic: committing an
    /// offset behind the current cursor is a silent no-op.
    pub fn mark_committed(&self, offset: u64) {
        self.commit_tracker.mark_committed(offset);
        let uncommitted = self
            .latest_offset()
            .map(|latest| latest.saturating_sub(offset) as i64)
            .unwrap_or(0);
        self.metrics
            .uncommitted_messages
            .store(uncommitted, Ordering::Relaxed);
        if let Ok(log) = self.lock_log() {
            self.publish_throttle_state(&log);
        }
    }

    pub fn committed_offset(&self) -> Option<u64> {
        self.commit_tracker.committed_offset()
    }

    pub fn base_offset(&self) -> JournalResult<u64> {
        Ok(self.lock_log()?.base_offset())
    }

    pub fn next_offset(&self) -> JournalResult<u64> {
        Ok(self.lock_log()?.next_offset())
    }

    pub fn latest_offset(&self) -> Option<u64> {
        self.lock_log().ok().and_then(|log| log.latest_offset())
    }

    pub fn total_size(&self) -> JournalResult<u64> {
        Ok(self.lock_log()?.total_size())
    }

    pub fn segment_count(&self) -> JournalResult<usize> {
        Ok(self.lock_log()?.segment_count())
    }

    /// Forces an fsync of the active segment, independent of the
    /// background flush job's schedule.
    pub fn flush(&self) -> JournalResult<()> {
        let mut log = self.lock_log()?;
        log.flush()?;
        self.record_log_gauges(&log);
        self.metrics
            .last_flush_time_millis
            .store(self.clock.now_millis(), Ordering::Relaxed);
        Ok(())
    }

    /// Drops all records at and beyond `offset`.
    pub fn truncate_to(&self, offset: u64) -> JournalResult<()> {
        self.lock_log()?.truncate(offset)?;
        Ok(())
    }

    fn lock_log(&self) -> JournalResult<std::sync::MutexGuard<'_, Log>> {
        self.log
            .lock()
            .map_err(|_| JournalError::Internal {
                message: "journal log mutex was poisoned by a previous panic".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::storage::retention::RetentionManager;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_journal(dir: &TempDir) -> Journal {
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        Journal::open(config, Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let (first, last) = journal
            .write(&[
                (Some(b"k1".to_vec()), b"v1".to_vec()),
                (None, b"v2".to_vec()),
            ])
            .unwrap();
        assert_eq!((first, last), (0, 1));

        let records = journal.read(0, 4096, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"v1");
        assert_eq!(records[1].payload, b"v2");
    }

    #[test]
    fn commit_tracking_is_monotonic_and_persists() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);
        journal.write(&[(None, b"a".to_vec())]).unwrap();

        assert_eq!(journal.committed_offset(), None);
        journal.mark_committed(0);
        assert_eq!(journal.committed_offset(), Some(0));
        journal.mark_committed(0);
        assert_eq!(journal.committed_offset(), Some(0));
    }

    #[test]
    fn offset_accessors_track_written_batches() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);
        assert_eq!(journal.latest_offset(), None);

        journal.write(&[(None, b"a".to_vec()), (None, b"b".to_vec())]).unwrap();
        assert_eq!(journal.latest_offset(), Some(1));
        assert_eq!(journal.next_offset().unwrap(), 2);
        assert_eq!(journal.base_offset().unwrap(), 0);
    }

    #[test]
    fn read_past_log_start_after_retention_clamps_with_a_warning() {
        let dir = TempDir::new().unwrap();
        let manual = Arc::new(ManualClock::new(0));
        let clock: Arc<dyn Clock> = manual.clone();

        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.segment_bytes = 40;
        config.retention_age = Duration::from_secs(1);

        let journal = Journal::open(config.clone(), clock.clone()).unwrap();
        for i in 0..5u64 {
            journal
                .write(&[(None, format!("r{i}").into_bytes())])
                .unwrap();
        }
        assert!(journal.segment_count().unwrap() >= 2);

        manual.advance(Duration::from_secs(10).as_millis() as i64);

        {
            let mut log = journal.log.lock().unwrap();
            let mut manager = RetentionManager::new(clock.clone());
            manager.sweep(log.segments_mut(), &config, None).unwrap();
        }

        let new_start = journal.base_offset().unwrap();
        assert!(new_start > 0);

        let records = journal.read(0, 4096, None).unwrap();
        assert_eq!(records[0].offset, new_start);
    }

    #[test]
    fn create_entry_and_write_one_round_trip() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let entry = Journal::create_entry(Some(b"k".to_vec()), b"v".to_vec());
        let last = journal.write_one(entry.0, entry.1).unwrap();
        assert_eq!(last, 0);

        let records = journal.read(0, 4096, None).unwrap();
        assert_eq!(records[0].payload, b"v");
    }

    #[test]
    fn cursor_based_read_advances_next_read_offset() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);
        assert_eq!(journal.next_read_offset(), 0);

        journal
            .write(&[
                (None, b"a".to_vec()),
                (None, b"b".to_vec()),
                (None, b"c".to_vec()),
            ])
            .unwrap();

        let first_batch = journal.read_next(2).unwrap();
        assert_eq!(first_batch.len(), 2);
        assert_eq!(journal.next_read_offset(), 2);

        let second_batch = journal.read_next(2).unwrap();
        assert_eq!(second_batch.len(), 1);
        assert_eq!(second_batch[0].payload, b"c");
        assert_eq!(journal.next_read_offset(), 3);
    }

    #[test]
    fn read_at_log_end_offset_returns_empty_not_an_error() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        journal
            .write(&[(None, b"a".to_vec()), (None, b"b".to_vec())])
            .unwrap();

        // Drain the two records, landing the cursor exactly on logEndOffset.
        let caught_up = journal.read_next(10).unwrap();
        assert_eq!(caught_up.len(), 2);
        assert_eq!(journal.next_read_offset(), 2);

        // A caught-up consumer polling again must see an empty batch, not
        // OffsetNotFound/OffsetOutOfRange.
        let polled_again = journal.read_next(10).unwrap();
        assert!(polled_again.is_empty());
        assert_eq!(journal.next_read_offset(), 2, "cursor does not move on an empty read");

        // A new record lands at the cursor; the next poll must see it.
        journal.write(&[(None, b"c".to_vec())]).unwrap();
        let caught_up_again = journal.read_next(10).unwrap();
        assert_eq!(caught_up_again.len(), 1);
        assert_eq!(caught_up_again[0].payload, b"c");
    }

    #[test]
    fn next_read_offset_resumes_after_commit_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let journal = open_journal(&dir);
            journal
                .write(&[(None, b"a".to_vec()), (None, b"b".to_vec())])
                .unwrap();
            journal.mark_committed(0);
            journal.commit_tracker.persist().unwrap();
        }

        let journal = open_journal(&dir);
        assert_eq!(journal.next_read_offset(), 1);
    }

    #[test]
    fn throttle_state_reflects_uncommitted_count_and_is_settable() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        journal
            .write(&[(None, b"a".to_vec()), (None, b"b".to_vec())])
            .unwrap();
        assert_eq!(journal.throttle_state().uncommitted_messages, 2);

        journal.mark_committed(0);
        assert_eq!(journal.throttle_state().uncommitted_messages, 1);

        let manual = ThrottleState {
            uncommitted_messages: 99,
            oldest_segment_millis: Some(42),
            utilization_percent: 12.5,
        };
        journal.set_throttle_state(manual);
        assert_eq!(journal.throttle_state(), manual);
    }

    #[test]
    fn flush_updates_recovery_point_last_flush_time_and_oldest_segment_metrics() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let before = journal.metrics().snapshot();
        assert_eq!(before.recovery_point, 0);
        assert_eq!(before.last_flush_time_millis, 0);
        assert_eq!(before.oldest_segment_millis, 0);

        journal
            .write(&[(None, b"a".to_vec()), (None, b"b".to_vec())])
            .unwrap();
        journal.flush().unwrap();

        let after = journal.metrics().snapshot();
        assert_eq!(after.recovery_point, 2);
        assert!(after.last_flush_time_millis > 0);
        assert!(after.oldest_segment_millis > 0);
    }

    #[test]
    fn segment_rolls_on_size_and_reads_span_the_whole_log() {
        let dir = TempDir::new().unwrap();
        let mut config = JournalConfig::default();
        config.journal_directory = dir.path().to_path_buf();
        config.segment_bytes = 128;
        let journal = Journal::open(config, Arc::new(SystemClock)).unwrap();

        for _ in 0..20u64 {
            journal.write(&[(None, vec![7u8; 16])]).unwrap();
        }

        assert_eq!(journal.next_offset().unwrap(), 20);
        assert!(journal.segment_count().unwrap() >= 2);

        let records = journal.read(0, 4096, None).unwrap();
        assert_eq!(records.len(), 20);
    }

    #[test]
    fn crash_recovery_survives_reopen_after_flush() {
        let dir = TempDir::new().unwrap();

        {
            let journal = open_journal(&dir);
            for i in 0..100u64 {
                journal
                    .write(&[(None, format!("record-{i}").into_bytes())])
                    .unwrap();
            }
            journal.flush().unwrap();
            journal.mark_committed(99);
            journal.commit_tracker.persist().unwrap();
        }

        let journal = open_journal(&dir);
        assert_eq!(journal.next_offset().unwrap(), 100);
        assert_eq!(journal.next_read_offset(), 100);

        let records = journal.read(0, 1024 * 1024, None).unwrap();
        assert_eq!(records.len(), 100);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.offset, i as u64);
            assert_eq!(record.payload, format!("record-{i}").into_bytes());
        }
    }
}

//! Log is a collection of segments that abstracts a single append-only,
//! crash-recoverable journal. It owns segment rotation, offset assignment,
//! and routing reads to the segment that holds them.
use crate::clock::Clock;
use crate::config::JournalConfig;
use crate::errors::LogError;
use crate::storage::record::Record;
use crate::storage::segment::{PendingEntry, Segment};
use crate::storage::segment_set::SegmentSet;
use crate::LogResult;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Log {
    segments: SegmentSet,
    config: JournalConfig,
    clock: Arc<dyn Clock>,
    recovery_point: u64,
    unflushed_messages: u64,
    dirty_since_millis: Option<i64>,
}

impl Log {
    #[instrument(skip_all, fields(log_dir = ?config.journal_directory))]
    pub fn new(config: JournalConfig, clock: Arc<dyn Clock>) -> LogResult<Self> {
        debug!("Creating new log");

        fs::create_dir_all(&config.journal_directory).map_err(|e| LogError::DirectoryError {
            path: config.journal_directory.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut log = Log {
            segments: SegmentSet::new(),
            config,
            clock,
            recovery_point: 0,
            unflushed_messages: 0,
            dirty_since_millis: None,
        };

        log.load_segments()?;
        log.recovery_point = log.next_offset();

        info!(
            segments_count = log.segments.len(),
            next_offset = log.next_offset(),
            "Log created successfully"
        );

        Ok(log)
    }

    /// Appends a batch of entries atomically, assigning them sequential
    /// offsets. Rolls to a new segment first if the active segment is full
    /// or has aged out; rejects the whole batch with `BatchTooLarge` if it
    /// can never fit in an empty segment.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn append(&mut self, entries: &[PendingEntry]) -> LogResult<(u64, u64)> {
        if entries.is_empty() {
            let next = self.next_offset();
            return Ok((next, next));
        }

        let batch_len: u64 = entries
            .iter()
            .enumerate()
            .map(|(i, (key, payload))| {
                Record::new(self.next_offset() + i as u64, key.clone(), payload.clone())
                    .encoded_len() as u64
            })
            .sum();

        if batch_len > self.config.segment_bytes {
            return Err(LogError::BatchTooLarge {
                batch_len,
                segment_bytes: self.config.segment_bytes,
            });
        }

        if self.should_roll() {
            self.rotate_segment()?;
        }

        let (first_offset, last_offset) = match self.active_segment_mut().append(entries) {
            Ok(result) => result,
            Err(_) => {
                // boundary race: batch didn't fit in the nearly-full active
                // segment. Roll once and retry against a fresh segment.
                self.rotate_segment()?;
                self.active_segment_mut().append(entries)?
            }
        };

        self.unflushed_messages += entries.len() as u64;
        if self.dirty_since_millis.is_none() {
            self.dirty_since_millis = Some(self.clock.now_millis());
        }
        if self.unflushed_messages >= self.config.flush_interval_messages {
            self.flush()?;
        }

        info!(first_offset, last_offset, "batch appended to log");
        Ok((first_offset, last_offset))
    }

    /// Reads whole records starting at `offset`, bounded by `max_bytes` and
    /// an optional exclusive upper offset bound. `offset == logEndOffset`
    /// (a caught-up reader) is not an error: nothing has been appended past
    /// the cursor yet, so this returns an empty batch rather than
    /// `OffsetNotFound` -- a subsequent read at the same offset must be
    /// able to succeed once a new record lands there.
    #[instrument(skip(self), fields(offset))]
    pub fn read(
        &self,
        offset: u64,
        max_bytes: u64,
        upper_bound_offset: Option<u64>,
    ) -> LogResult<Vec<Record>> {
        if offset < self.base_offset() {
            return Err(LogError::OffsetOutOfRange {
                offset,
                log_start_offset: self.base_offset(),
            });
        }
        if offset == self.next_offset() {
            return Ok(Vec::new());
        }
        let segment = self.find_segment_for_offset(offset)?;
        Ok(segment.read(offset, max_bytes, upper_bound_offset)?)
    }

    pub fn next_offset(&self) -> u64 {
        self.segments
            .active()
            .map(|s| s.next_offset())
            .unwrap_or(0)
    }

    /// Returns the lowest offset still available in the log.
    pub fn base_offset(&self) -> u64 {
        self.segments.first().map(|s| s.base_offset()).unwrap_or(0)
    }

    /// Returns the highest offset in the log (if any records exist).
    pub fn latest_offset(&self) -> Option<u64> {
        let next = self.next_offset();
        if next > self.base_offset() {
            Some(next - 1)
        } else {
            None
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() || self.segments.iter().all(|s| s.is_empty())
    }

    /// Total size of the log: the sum of all segment store sizes in bytes.
    pub fn total_size(&self) -> u64 {
        self.segments.iter().map(|s| s.store_size()).sum()
    }

    pub fn recovery_point(&self) -> u64 {
        self.recovery_point
    }

    pub fn unflushed_messages(&self) -> u64 {
        self.unflushed_messages
    }

    /// Whether the log has been dirty longer than `flush_age`.
    pub fn should_force_flush(&self) -> bool {
        match self.dirty_since_millis {
            Some(since) => {
                self.clock.now_millis() - since >= self.config.flush_age.as_millis() as i64
            }
            None => false,
        }
    }

    /// fsyncs the active segment and advances the recovery checkpoint.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> LogResult<()> {
        if let Some(segment) = self.segments.active_mut() {
            segment.flush()?;
        }
        self.recovery_point = self.next_offset();
        self.unflushed_messages = 0;
        self.dirty_since_millis = None;
        Ok(())
    }

    /// Drops all records at and beyond `offset`, deleting any segments
    /// that start after it. Used for crash recovery's replay point and
    /// for explicit administrative truncation.
    #[instrument(skip(self), fields(offset))]
    pub fn truncate(&mut self, offset: u64) -> LogResult<()> {
        info!(offset, "Truncating log");

        let target_base = match self.find_segment_for_offset(offset) {
            Ok(segment) => segment.base_offset(),
            Err(_) if offset >= self.next_offset() => return Ok(()),
            Err(err) => return Err(err),
        };

        let removed = self.segments.drain_after(target_base);
        for segment in &removed {
            let _ = fs::remove_file(segment.store_path());
            let _ = fs::remove_file(segment.index_path());
        }

        if let Some(segment) = self.segments.active_mut() {
            if segment.base_offset() == target_base {
                segment.truncate_to(offset)?;
            }
        }

        self.recovery_point = self.next_offset();
        info!(offset, removed = removed.len(), "log truncated");
        Ok(())
    }

    /// Writes the recovery-point checkpoint file: a single-partition
    /// rendition of spec.md §6's `recovery-point-offset-checkpoint` format
    /// (version line, count line, then `<partition> <offset>` lines).
    #[instrument(skip(self))]
    pub fn write_recovery_checkpoint(&self) -> LogResult<()> {
        let path = self
            .config
            .journal_directory
            .join("recovery-point-offset-checkpoint");
        let contents = format!("0\n1\n0 {}\n", self.recovery_point);
        fs::write(&path, contents).map_err(|source| LogError::CheckpointWriteFailed {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }

    /// Creation time of the oldest (lowest-base-offset) retained segment,
    /// used by the journal's published throttle-state snapshot.
    pub fn oldest_segment_millis(&self) -> Option<i64> {
        self.segments.first().map(|s| s.created_millis())
    }

    pub fn segments(&self) -> &SegmentSet {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentSet {
        &mut self.segments
    }

    fn should_roll(&self) -> bool {
        match self.segments.active() {
            None => true,
            Some(segment) => {
                segment.is_full()
                    || segment.age_millis() >= self.config.segment_age.as_millis() as i64
            }
        }
    }

    /// Creates a new active segment and flushes the previous one, so every
    /// non-active segment is always durable on disk.
    #[instrument(skip(self))]
    fn rotate_segment(&mut self) -> LogResult<()> {
        if let Some(segment) = self.segments.active_mut() {
            segment.flush()?;
        }

        let base_offset = self.next_offset();
        debug!(base_offset, "rolling to new segment");

        let segment = self.create_segment(base_offset)?;
        self.segments.push(segment);

        info!(
            base_offset,
            total_segments = self.segments.len(),
            "segment rotated successfully"
        );
        Ok(())
    }

    /// Scans the journal directory for existing segment file pairs and
    /// loads them in base-offset order; creates the first segment if none
    /// exist.
    #[instrument(skip(self))]
    fn load_segments(&mut self) -> LogResult<()> {
        debug!("loading existing segments");

        let mut base_offsets: Vec<u64> = fs::read_dir(&self.config.journal_directory)
            .map_err(|e| LogError::DirectoryError {
                path: self.config.journal_directory.to_string_lossy().to_string(),
                source: e,
            })?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                let base = name.strip_suffix(".log")?;
                base.parse::<u64>().ok()
            })
            .collect();
        base_offsets.sort_unstable();
        base_offsets.dedup();

        if base_offsets.is_empty() {
            let segment = self.create_segment(0)?;
            self.segments.push(segment);
            return Ok(());
        }

        for base_offset in base_offsets {
            match self.create_segment(base_offset) {
                Ok(segment) => self.segments.push(segment),
                Err(err) => {
                    warn!(base_offset, error = %err, "failed to load segment, skipping");
                }
            }
        }

        Ok(())
    }

    fn create_segment(&self, base_offset: u64) -> LogResult<Segment> {
        let store_path = self
            .config
            .journal_directory
            .join(format!("{base_offset:020}.log"));
        let index_path = self
            .config
            .journal_directory
            .join(format!("{base_offset:020}.idx"));

        debug!(
            base_offset,
            store_path = ?store_path,
            index_path = ?index_path,
            "creating segment files"
        );

        Segment::new(
            store_path,
            index_path,
            base_offset,
            self.config.segment_bytes,
            self.config.max_index_size_bytes,
            self.config.index_interval_bytes,
            self.clock.clone(),
        )
        .map_err(LogError::from)
    }

    fn find_segment_for_offset(&self, offset: u64) -> LogResult<&Segment> {
        self.segments
            .find_containing(offset)
            .ok_or(LogError::OffsetNotFound {
                offset,
                base_offset: self.base_offset(),
                next_offset: self.next_offset(),
            })
    }

    fn active_segment_mut(&mut self) -> &mut Segment {
        self.segments
            .active_mut()
            .expect("log always has at least one segment")
    }
}

//! Segment combines the Store and Index to provide a logical log segment.
//! Each segment handles a contiguous range of offsets and manages the
//! coordination between storing data and indexing it.
use crate::clock::Clock;
use crate::errors::SegmentError;
use crate::storage::index::Index;
use crate::storage::record::Record;
use crate::storage::store::Store;
use crate::SegmentResult;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A `(key, payload)` pair not yet assigned an offset.
pub type PendingEntry = (Option<Vec<u8>>, Vec<u8>);

pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64, // First offset in this segment
    next_offset: u64,
    max_store_bytes: u64,
    index_interval_bytes: u64,
    bytes_since_last_index_entry: u64,
    created_millis: i64,
    last_modified_millis: i64,
    clock: Arc<dyn Clock>,
}

impl Segment {
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(base_offset))]
    pub fn new(
        store_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        base_offset: u64,
        max_store_bytes: u64,
        max_index_size_bytes: u64,
        index_interval_bytes: u64,
        clock: Arc<dyn Clock>,
    ) -> SegmentResult<Self> {
        debug!(base_offset, "Creating a new segment");

        let mut store = Store::new(store_path)?;
        let mut index = Index::new(index_path, max_index_size_bytes)?;

        let (next_offset, bytes_since_last_index_entry) =
            Self::recover(&mut store, &mut index, base_offset)?;

        let now = clock.now_millis();
        info!(
            base_offset,
            next_offset,
            store_size = store.size(),
            index_entries = index.len(),
            "Segment created successfully"
        );

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            max_store_bytes,
            index_interval_bytes,
            bytes_since_last_index_entry,
            created_millis: now,
            last_modified_millis: now,
            clock,
        })
    }

    /// Scans the store forward from the last sparse index entry, decoding
    /// records until either the data runs out or a record fails to decode
    /// (a crash mid-write). On corruption the store and index are
    /// truncated to the last known-good record; a segment never surfaces
    /// `CorruptSegment` from here, it recovers in place.
    fn recover(store: &mut Store, index: &mut Index, base_offset: u64) -> SegmentResult<(u64, u64)> {
        let (mut position, mut current_offset) = match index.floor_entry(u64::MAX)? {
            Some((offset, pos)) => (pos, offset),
            None => (0, base_offset),
        };

        let mut scanned_any = false;
        loop {
            let window = store.read_window(position)?;
            if window.is_empty() {
                break;
            }
            match Record::decode(window) {
                Ok((record, consumed)) => {
                    if !scanned_any {
                        current_offset = record.offset;
                        scanned_any = true;
                    }
                    if record.offset != current_offset {
                        warn!(
                            expected = current_offset,
                            found = record.offset,
                            position,
                            "offset gap detected during recovery scan, truncating"
                        );
                        break;
                    }
                    position += consumed as u64;
                    current_offset += 1;
                }
                Err(err) => {
                    warn!(
                        position,
                        error = %err,
                        "corrupt or partial record found during recovery scan, truncating segment"
                    );
                    break;
                }
            }
        }

        if position != store.size() {
            store.truncate_to(position);
        }
        index.truncate_to(current_offset)?;

        let bytes_since_last_index_entry = match index.floor_entry(current_offset.saturating_sub(1))
        {
            Ok(Some((_, indexed_position))) => position.saturating_sub(indexed_position),
            _ => position,
        };

        Ok((current_offset, bytes_since_last_index_entry))
    }

    /// Appends a contiguous run of entries, assigning them sequential
    /// offsets starting at `next_offset`. All entries are written or none
    /// are: the whole batch's encoded size is validated against remaining
    /// capacity before anything is written.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn append(&mut self, entries: &[PendingEntry]) -> SegmentResult<(u64, u64)> {
        if entries.is_empty() {
            return Ok((self.next_offset, self.next_offset));
        }

        let encoded: Vec<Vec<u8>> = entries
            .iter()
            .enumerate()
            .map(|(i, (key, payload))| {
                Record::new(self.next_offset + i as u64, key.clone(), payload.clone()).encode()
            })
            .collect::<Result<_, _>>()?;

        let batch_len: u64 = encoded.iter().map(|e| e.len() as u64).sum();
        let current_size = self.store.size();
        if current_size + batch_len > self.max_store_bytes {
            return Err(SegmentError::SegmentFull {
                base_offset: self.base_offset,
                max_size: self.max_store_bytes,
                current_size,
            });
        }
        if self.index.is_full() {
            return Err(SegmentError::SegmentFull {
                base_offset: self.base_offset,
                max_size: self.max_store_bytes,
                current_size,
            });
        }

        let first_offset = self.next_offset;
        for encoded_record in &encoded {
            let offset = self.next_offset;
            let (position, bytes_written) = self.store.append(encoded_record)?;

            self.bytes_since_last_index_entry += bytes_written;
            if self.index.is_empty()
                || self.bytes_since_last_index_entry >= self.index_interval_bytes
            {
                self.index.write(offset, position)?;
                self.bytes_since_last_index_entry = 0;
            }

            self.next_offset += 1;
        }
        let last_offset = self.next_offset - 1;
        self.last_modified_millis = self.clock.now_millis();

        info!(
            first_offset,
            last_offset,
            segment_base = self.base_offset,
            "Batch appended to segment"
        );

        Ok((first_offset, last_offset))
    }

    /// Reads whole records in `[start_offset, upper_bound_offset)`
    /// (exclusive upper, `None` meaning "no bound"), limited to `max_bytes`
    /// total encoded size. At least one record is always returned if one
    /// exists at `start_offset`, even if it alone exceeds `max_bytes` — this
    /// keeps an oversized record from starving a consumer entirely.
    #[instrument(skip(self), fields(start_offset, max_bytes))]
    pub fn read(
        &self,
        start_offset: u64,
        max_bytes: u64,
        upper_bound_offset: Option<u64>,
    ) -> SegmentResult<Vec<Record>> {
        if start_offset < self.base_offset || start_offset >= self.next_offset {
            return Err(SegmentError::OffsetOutOfRange {
                offset: start_offset,
                base_offset: self.base_offset,
                next_offset: self.next_offset,
            });
        }

        let (mut scanning_offset, mut cursor) = match self.index.floor_entry(start_offset)? {
            Some((offset, pos)) => (offset, pos),
            None => (self.base_offset, 0),
        };

        let mut out = Vec::new();
        let mut bytes_read: u64 = 0;

        loop {
            if scanning_offset >= self.next_offset {
                break;
            }
            if let Some(upper) = upper_bound_offset {
                if scanning_offset >= upper {
                    break;
                }
            }

            let window = self.store.read_window(cursor)?;
            if window.is_empty() {
                break;
            }
            let (record, consumed) = Record::decode(window)?;
            let record_len = consumed as u64;

            if scanning_offset >= start_offset {
                let would_exceed = bytes_read + record_len > max_bytes;
                if would_exceed && !out.is_empty() {
                    break;
                }
                out.push(record);
                bytes_read += record_len;
                if would_exceed {
                    break;
                }
            }

            cursor += consumed as u64;
            scanning_offset += 1;
        }

        debug!(
            start_offset,
            returned = out.len(),
            bytes_read,
            "segment read complete"
        );
        Ok(out)
    }

    /// fsyncs the store and index files.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> SegmentResult<()> {
        self.store.flush()?;
        self.index.flush()?;
        Ok(())
    }

    /// Drops records at and beyond `offset`. Required for crash recovery
    /// and explicit truncation.
    #[instrument(skip(self))]
    pub fn truncate_to(&mut self, offset: u64) -> SegmentResult<()> {
        if offset <= self.base_offset {
            self.store.truncate_to(0);
            self.index.truncate_to(self.base_offset)?;
            self.next_offset = self.base_offset;
            self.bytes_since_last_index_entry = 0;
            return Ok(());
        }
        if offset >= self.next_offset {
            return Ok(());
        }

        let position = match self.index.floor_entry(offset)? {
            Some((indexed_offset, pos)) if indexed_offset < offset => {
                let mut cursor = pos;
                let mut scanning = indexed_offset;
                loop {
                    if scanning >= offset {
                        break;
                    }
                    let window = self.store.read_window(cursor)?;
                    let (_, consumed) = Record::decode(window)?;
                    cursor += consumed as u64;
                    scanning += 1;
                }
                cursor
            }
            Some((_, pos)) => pos,
            None => 0,
        };

        self.store.truncate_to(position);
        self.index.truncate_to(offset)?;
        self.next_offset = offset;
        self.bytes_since_last_index_entry = 0;
        Ok(())
    }

    /// Returns the base offset (first offset) of this segment
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn store_path(&self) -> &str {
        self.store.path()
    }

    pub fn index_path(&self) -> &str {
        self.index.path()
    }

    /// Returns the next offset that would be assigned
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn last_offset(&self) -> Option<u64> {
        if self.next_offset > self.base_offset {
            Some(self.next_offset - 1)
        } else {
            None
        }
    }

    /// Returns true if the offset is within the segment's range
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    /// True if the segment should be rolled: full data file or full index.
    /// Age-based rolling is the Log's responsibility, it owns the clock
    /// comparison against the configured segment age.
    pub fn is_full(&self) -> bool {
        self.store.size() >= self.max_store_bytes || self.index.is_full()
    }

    /// Returns the current size of the store in bytes
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Returns the number of entries in the index
    pub fn index_entries(&self) -> u64 {
        self.index.len()
    }

    /// Returns true if the segment is empty
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    pub fn created_millis(&self) -> i64 {
        self.created_millis
    }

    pub fn last_modified_millis(&self) -> i64 {
        self.last_modified_millis
    }

    pub fn age_millis(&self) -> i64 {
        self.clock.now_millis() - self.created_millis
    }
}

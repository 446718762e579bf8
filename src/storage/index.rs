//! The index file speeds up reads. It maps record offsets to the position in the store file.
//! As such, reading a record is a two-step process: first - get the entry from the index file for the record which tell you
//! the position of the record in store file, and then read the record at that position.
//!
//! The index is sparse: a segment only writes one entry roughly every
//! `index_interval_bytes` of store data (see `Segment::append`), not one
//! entry per record. A lookup therefore binary-searches for the greatest
//! indexed offset `<= target` and the segment linearly scans forward in
//! the store from there — the index is never assumed complete.
use crate::errors::IndexError;
use crate::storage::IndexContext;
use crate::IndexResult;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

// Each index entry: 8 bytes offset + 8 bytes position = 16 bytes
const OFFSET_WIDTH: u64 = 8;
const POSITION_WIDTH: u64 = 8;
const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;
const INITIAL_ENTRIES: u64 = 1000;

/// Index provides fast lookups from log offsets to positions in the Store.
/// Each entry maps a sequential offset to a byte position in the Store file.
///
/// Format: [8-byte offset][8-byte position][8-byte offset][8-byte position] etc.
pub struct Index {
    file: File,
    mmap: MmapMut,
    size: u64, // number of entries (not bytes)
    max_entries: u64,
    path: String,
}

impl Index {
    #[instrument(skip_all, fields(path = ?path.as_ref()))]
    /// Create a new index from the given file path.
    /// If the file doesn't exist, create it
    pub fn new(path: impl AsRef<Path>, max_size_bytes: u64) -> IndexResult<Self> {
        debug!("Opening index file");

        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
            .with_open_context(&path_str)?;

        let mut file_len = file.metadata().with_open_context(&path_str)?.len();

        debug!(existing_size = file_len, "Index file opened");

        // Validate the file size, must be a multiple of ENTRY_WIDTH
        if file_len % ENTRY_WIDTH != 0 {
            warn!(
                file_size = file_len,
                entry_width = ENTRY_WIDTH,
                "Index file size is not a multiple of entry size - truncating"
            );

            let valid_size = (file_len / ENTRY_WIDTH) * ENTRY_WIDTH;
            file.set_len(valid_size)
                .map_err(|e| IndexError::CorruptedFile {
                    reason: format!("failed to truncate corrupted index file: {e}"),
                })?;

            file_len = valid_size;
        }

        let max_entries = std::cmp::max(max_size_bytes / ENTRY_WIDTH, 1);

        // Ensure file has at least some size for memory mapping, capped by
        // max_size_bytes so we never map more than the index is allowed to
        // hold.
        let default_entries = std::cmp::min(INITIAL_ENTRIES, max_entries);
        let initial_size = if file_len == 0 {
            let new_size = default_entries * ENTRY_WIDTH;
            file.set_len(new_size).with_grow_context(0, new_size)?;
            file.sync_all().with_grow_context(0, new_size)?;
            new_size
        } else {
            std::cmp::max(file_len, default_entries * ENTRY_WIDTH)
        };

        // create the memmap file for index
        let mmap = unsafe {
            MmapOptions::new()
                .len(initial_size as usize)
                .map_mut(&file)
                .with_mmap_context(initial_size)?
        };

        let num_entries = file_len / ENTRY_WIDTH;

        info!(
            file_size = file_len,
            map_size = initial_size,
            num_entries = num_entries,
            "Index created successfully"
        );

        Ok(Index {
            file,
            mmap,
            size: num_entries,
            max_entries,
            path: path_str,
        })
    }

    /// Return the number of entries in the index
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Return file size in bytes
    pub fn size(&self) -> u64 {
        self.size * ENTRY_WIDTH
    }

    /// Whether the index has reached its configured hard cap
    /// (`maxIndexSize`).
    pub fn is_full(&self) -> bool {
        self.size >= self.max_entries
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Appends a new `(offset, position)` entry.
    #[instrument(skip(self))]
    pub fn write(&mut self, offset: u64, position: u64) -> IndexResult<()> {
        if self.is_full() {
            return Err(IndexError::IndexFull);
        }

        if (self.size + 1) * ENTRY_WIDTH > self.mmap.len() as u64 {
            self.grow()?;
        }

        let entry_pos = (self.size * ENTRY_WIDTH) as usize;
        self.mmap[entry_pos..entry_pos + OFFSET_WIDTH as usize]
            .copy_from_slice(&offset.to_be_bytes());
        self.mmap[entry_pos + OFFSET_WIDTH as usize..entry_pos + ENTRY_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());
        self.size += 1;

        Ok(())
    }

    /// Returns the store position for an exact offset, if it was indexed.
    pub fn read(&self, offset: u64) -> IndexResult<u64> {
        let idx = self
            .find_exact(offset)
            .ok_or(IndexError::OffsetNotFound { offset })?;
        self.read_position_at_index(idx)
    }

    /// Binary-searches for the entry with the greatest offset `<= target`.
    /// Returns `None` if every indexed offset is greater than `target` or
    /// the index is empty. The caller (the segment) linearly scans forward
    /// in the store from the returned position.
    pub fn floor_entry(&self, target: u64) -> IndexResult<Option<(u64, u64)>> {
        if self.size == 0 {
            return Ok(None);
        }

        let mut lo: i64 = 0;
        let mut hi: i64 = self.size as i64 - 1;
        let mut found: Option<i64> = None;

        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let offset = self.read_offset_at_index(mid as u64)?;
            if offset <= target {
                found = Some(mid);
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }

        match found {
            Some(idx) => {
                let offset = self.read_offset_at_index(idx as u64)?;
                let position = self.read_position_at_index(idx as u64)?;
                Ok(Some((offset, position)))
            }
            None => Ok(None),
        }
    }

    /// Returns the offset stored at sparse-index slot `i` (not a log
    /// offset lookup — `i` is the entry's ordinal position).
    pub fn read_offset_at_index(&self, i: u64) -> IndexResult<u64> {
        self.entry_bounds_check(i)?;
        let entry_pos = (i * ENTRY_WIDTH) as usize;
        let bytes: [u8; 8] = self.mmap[entry_pos..entry_pos + 8]
            .try_into()
            .map_err(|_| IndexError::CorruptedEntry {
                position: entry_pos as u64,
            })?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn read_position_at_index(&self, i: u64) -> IndexResult<u64> {
        self.entry_bounds_check(i)?;
        let entry_pos = (i * ENTRY_WIDTH) as usize;
        let bytes: [u8; 8] = self.mmap[entry_pos + 8..entry_pos + 16]
            .try_into()
            .map_err(|_| IndexError::CorruptedEntry {
                position: entry_pos as u64,
            })?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn entry_bounds_check(&self, i: u64) -> IndexResult<()> {
        if i >= self.size {
            return Err(IndexError::CorruptedEntry { position: i });
        }
        Ok(())
    }

    fn find_exact(&self, offset: u64) -> Option<u64> {
        let mut lo: i64 = 0;
        let mut hi: i64 = self.size as i64 - 1;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let candidate = self.read_offset_at_index(mid as u64).ok()?;
            if candidate == offset {
                return Some(mid as u64);
            } else if candidate < offset {
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        None
    }

    /// Truncates the index so that no entry has offset `>= offset`.
    #[instrument(skip(self))]
    pub fn truncate_to(&mut self, offset: u64) -> IndexResult<()> {
        let mut new_size = self.size;
        while new_size > 0 {
            let candidate_offset = self.read_offset_at_index(new_size - 1)?;
            if candidate_offset < offset {
                break;
            }
            new_size -= 1;
        }
        self.size = new_size;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn flush(&mut self) -> IndexResult<()> {
        self.mmap.flush().map_err(|source| IndexError::WriteFailed {
            position: self.size,
            source,
        })?;
        self.file.sync_all().map_err(|source| IndexError::WriteFailed {
            position: self.size,
            source,
        })?;
        Ok(())
    }

    fn grow(&mut self) -> IndexResult<()> {
        let current_len = self.mmap.len() as u64;
        let target = std::cmp::min(current_len * 2, self.max_entries * ENTRY_WIDTH);
        if target <= current_len {
            return Err(IndexError::IndexFull);
        }

        debug!(current_len, target, path = %self.path, "growing index mapping");

        self.mmap.flush().map_err(|source| IndexError::WriteFailed {
            position: self.size,
            source,
        })?;
        self.file
            .set_len(target)
            .with_grow_context(current_len, target)?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(target as usize)
                .map_mut(&self.file)
                .with_mmap_context(target)?
        };
        self.mmap = mmap;
        Ok(())
    }
}

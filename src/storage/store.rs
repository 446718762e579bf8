//! Store is the append-only file underlying a segment. It holds the raw
//! concatenated bytes of already-framed records (see `storage::record`);
//! unlike the teacher's original version it does not add its own length
//! prefix, since the wire format in spec.md §6 is self-framing.
use crate::storage::StorageContext;
use crate::StorageResult;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, instrument};

const INITIAL_MMAP_LEN: u64 = 1024 * 1024;

/// An append-only, memory-mapped file. Bytes written via `append` are
/// visible to `read_window` immediately; durability to disk is only
/// guaranteed after `flush`.
pub struct Store {
    file: File,
    mmap: MmapMut,
    size: u64,
    path: String,
}

impl Store {
    #[instrument(skip_all, fields(path = ?path.as_ref()))]
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        debug!("Opening store file");
        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())
            .with_open_context(&path_str)?;

        let file_len = file.metadata().with_open_context(&path_str)?.len();
        debug!(existing_size = file_len, "Store file opened");

        let mapped_len = std::cmp::max(file_len, INITIAL_MMAP_LEN);
        Self::resize_file(&file, mapped_len)?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(mapped_len as usize)
                .map_mut(&file)
                .with_mmap_context(mapped_len)?
        };

        info!(
            data_size = file_len,
            map_size = mapped_len,
            "Store created successfully"
        );

        Ok(Store {
            file,
            mmap,
            size: file_len,
            path: path_str,
        })
    }

    /// Appends raw bytes (an already-encoded record) and returns
    /// `(position, bytes_written)`.
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub fn append(&mut self, data: &[u8]) -> StorageResult<(u64, u64)> {
        let needed = data.len() as u64;

        if self.size + needed > self.mmap.len() as u64 {
            self.grow(needed)?;
        }

        let pos = self.size;
        let end = pos + needed;
        self.mmap[pos as usize..end as usize].copy_from_slice(data);
        self.size = end;

        debug!(position = pos, bytes_written = needed, "record appended to store");
        Ok((pos, needed))
    }

    /// Returns the bytes from `position` to the current write frontier,
    /// without copying. Callers (the segment's record scan) slice further
    /// into this window themselves.
    pub fn read_window(&self, position: u64) -> StorageResult<&[u8]> {
        if position > self.size {
            return Err(crate::errors::StorageError::ReadBeyondEnd {
                position,
                size: self.size,
            });
        }
        Ok(&self.mmap[position as usize..self.size as usize])
    }

    /// Current number of logical (written) bytes in the store.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// fsyncs the mapping and the underlying file.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> StorageResult<()> {
        self.mmap.flush().with_sync_context(&self.path)?;
        self.file.sync_all().with_sync_context(&self.path)?;
        Ok(())
    }

    /// Truncates the store to `position` logical bytes. Used for crash
    /// recovery and explicit segment truncation. The underlying file keeps
    /// its allocated size; only the logical write frontier moves back, so
    /// the next `append` overwrites the discarded tail.
    #[instrument(skip(self))]
    pub fn truncate_to(&mut self, position: u64) {
        self.size = std::cmp::min(self.size, position);
    }

    fn grow(&mut self, additional: u64) -> StorageResult<()> {
        let current_map_len = self.mmap.len() as u64;
        let target = std::cmp::max(current_map_len * 2, self.size + additional);

        debug!(
            current_size = self.size,
            current_map_len, target, "growing store mapping"
        );

        self.mmap.flush().with_sync_context(&self.path)?;
        Self::resize_file(&self.file, target)?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(target as usize)
                .map_mut(&self.file)
                .with_mmap_context(target)?
        };
        self.mmap = mmap;
        Ok(())
    }

    fn resize_file(file: &File, target_len: u64) -> StorageResult<()> {
        let mut cloned = file.try_clone().with_open_context("store-resize-handle")?;
        cloned
            .seek(SeekFrom::Start(target_len - 1))
            .with_grow_context(0, target_len)?;
        cloned.write_all(&[0]).with_grow_context(0, target_len)?;
        cloned.sync_all().with_grow_context(0, target_len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_and_read_window_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::new(dir.path().join("store.log")).unwrap();

        let (pos_a, len_a) = store.append(b"hello").unwrap();
        let (pos_b, _) = store.append(b"world").unwrap();

        assert_eq!(pos_a, 0);
        assert_eq!(len_a, 5);
        assert_eq!(pos_b, 5);
        assert_eq!(store.size(), 10);

        let window = store.read_window(pos_a).unwrap();
        assert_eq!(&window[..5], b"hello");
        assert_eq!(&window[5..10], b"world");
    }

    #[test]
    fn grows_past_initial_mapping() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::new(dir.path().join("store.log")).unwrap();

        let chunk = vec![7u8; 1024];
        let mut last_pos = 0;
        for _ in 0..(INITIAL_MMAP_LEN / 1024 + 4) {
            let (pos, _) = store.append(&chunk).unwrap();
            last_pos = pos;
        }
        assert!(last_pos >= INITIAL_MMAP_LEN);
        let window = store.read_window(last_pos).unwrap();
        assert_eq!(&window[..1024], chunk.as_slice());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.log");
        {
            let mut store = Store::new(&path).unwrap();
            store.append(b"durable").unwrap();
            store.flush().unwrap();
        }
        let store = Store::new(&path).unwrap();
        assert_eq!(store.size(), 7);
        assert_eq!(&store.read_window(0).unwrap()[..7], b"durable");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("store.log")).unwrap();
        assert!(store.read_window(1).is_err());
    }
}

use std::io;
use thiserror::Error;

/// Top-level error for the journal façade; aggregates every subsystem.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Retention error: {0}")]
    Retention(#[from] RetentionError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Journal directory {path} is locked by another process")]
    LockFailed { path: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open store file: {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to store at position {position}")]
    WriteFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from store at position {position}")]
    ReadFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("Read position {position} is beyond store size {size}")]
    ReadBeyondEnd { position: u64, size: u64 },

    #[error("Corrupted record at position {position}: {reason}")]
    CorruptedRecord { position: u64, reason: String },

    #[error("Failed to grow store from {current_size} to {target_size}")]
    GrowFailed {
        current_size: u64,
        target_size: u64,
        #[source]
        source: io::Error,
    },

    #[error("Memory mapping failed for size {size}")]
    MmapFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("Entry exceeds the maximum encodable record size ({max} bytes): {actual}")]
    EntryTooLarge { actual: u64, max: u64 },

    #[error("fsync failed for {path}")]
    SyncFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Store is in read-only mode")]
    ReadOnly,
}

/// Index-related errors
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open index file: {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to index at position {position}")]
    WriteFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("Offset {offset} not found in index")]
    OffsetNotFound { offset: u64 },

    #[error("Index entry at position {position} is corrupted")]
    CorruptedEntry { position: u64 },

    #[error("Index file is corrupted: {reason}")]
    CorruptedFile { reason: String },

    #[error("Failed to grow index from {current_size} to {target_size}")]
    GrowFailed {
        current_size: u64,
        target_size: u64,
        #[source]
        source: io::Error,
    },

    #[error("Memory mapping failed for size {size}")]
    MmapFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("Index is full, cannot add more entries")]
    IndexFull,

    #[error("Invalid offset {offset}, must be >= {min_offset}")]
    InvalidOffset { offset: u64, min_offset: u64 },
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Segment is full: base={base_offset}, size={current_size}/{max_size}")]
    SegmentFull {
        base_offset: u64,
        max_size: u64,
        current_size: u64,
    },

    #[error("Offset {offset} out of range for segment {base_offset}..{next_offset}")]
    OffsetOutOfRange {
        offset: u64,
        base_offset: u64,
        next_offset: u64,
    },

    #[error("Segment at base offset {base_offset} is corrupt: {reason}")]
    CorruptSegment { base_offset: u64, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Directory error for path {path}")]
    DirectoryError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Offset {offset} not found (range: {base_offset}..{next_offset})")]
    OffsetNotFound {
        offset: u64,
        base_offset: u64,
        next_offset: u64,
    },

    #[error("Offset {offset} is out of range; log starts at {log_start_offset}")]
    OffsetOutOfRange { offset: u64, log_start_offset: u64 },

    #[error("Batch of {batch_len} bytes cannot fit in an empty segment of capacity {segment_bytes}")]
    BatchTooLarge { batch_len: u64, segment_bytes: u64 },

    #[error("Failed to write recovery checkpoint to {path}")]
    CheckpointWriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Failed to rename segment file {path} for deferred deletion")]
    RenameFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to unlink deferred-deletion file {path}")]
    UnlinkFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Scheduler jobs always log-and-swallow this; it never reaches a caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Log error during scheduled job: {0}")]
    Log(#[from] LogError),

    #[error("Retention error during scheduled job: {0}")]
    Retention(#[from] RetentionError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    MustBePositive { field: &'static str, value: i64 },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("journal directory path is empty")]
    EmptyDirectory,
}

/// Errors from the demonstration RPC façade and its call-site plumbing.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed to {address}")]
    ConnectionFailed { address: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Journal lock was poisoned by a previous panic")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Server unavailable")]
    ServerUnavailable,
}

impl JournalError {
    /// Whether the caller might reasonably retry this operation.
    pub fn is_recoverable(&self) -> bool {
        match self {
            JournalError::Storage(e) => e.is_recoverable(),
            JournalError::Network(NetworkError::Timeout { .. }) => true,
            JournalError::Network(NetworkError::ServerUnavailable) => true,
            _ => false,
        }
    }
}

impl StorageError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            StorageError::WriteFailed { .. } => true,
            StorageError::ReadFailed { .. } => true,
            StorageError::GrowFailed { .. } => true,
            StorageError::SyncFailed { .. } => true,
            StorageError::ReadBeyondEnd { .. } => false,
            StorageError::CorruptedRecord { .. } => false,
            StorageError::EntryTooLarge { .. } => false,
            StorageError::ReadOnly => false,
            StorageError::OpenFailed { .. } | StorageError::MmapFailed { .. } => false,
        }
    }
}

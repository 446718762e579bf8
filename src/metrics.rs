//! Metrics collected by the journal and its background jobs. Callers pass
//! a `JournalMetrics` in at construction time; nothing in this crate
//! reaches for a process-wide registry (see DESIGN.md's Design Notes).
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Plain atomic counters/gauges for the metric names named in the journal's
/// external interface. Rendering these to Prometheus or any other sink is
/// the surrounding application's job, not this crate's.
#[derive(Debug, Default)]
pub struct JournalMetrics {
    pub messages_written: AtomicU64,
    pub messages_read: AtomicU64,
    pub write_time_nanos: AtomicU64,
    pub read_time_nanos: AtomicU64,
    pub uncommitted_messages: AtomicI64,
    pub size_bytes: AtomicU64,
    pub log_end_offset: AtomicI64,
    pub number_of_segments: AtomicU64,
    pub unflushed_messages: AtomicU64,
    pub recovery_point: AtomicI64,
    pub last_flush_time_millis: AtomicI64,
    pub oldest_segment_millis: AtomicI64,
}

impl JournalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_write(&self, messages: u64, elapsed_nanos: u64) {
        self.messages_written.fetch_add(messages, Ordering::Relaxed);
        self.write_time_nanos
            .fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub fn record_read(&self, messages: u64, elapsed_nanos: u64) {
        self.messages_read.fetch_add(messages, Ordering::Relaxed);
        self.read_time_nanos
            .fetch_add(elapsed_nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_written: self.messages_written.load(Ordering::Relaxed),
            messages_read: self.messages_read.load(Ordering::Relaxed),
            write_time_nanos: self.write_time_nanos.load(Ordering::Relaxed),
            read_time_nanos: self.read_time_nanos.load(Ordering::Relaxed),
            uncommitted_messages: self.uncommitted_messages.load(Ordering::Relaxed),
            size_bytes: self.size_bytes.load(Ordering::Relaxed),
            log_end_offset: self.log_end_offset.load(Ordering::Relaxed),
            number_of_segments: self.number_of_segments.load(Ordering::Relaxed),
            unflushed_messages: self.unflushed_messages.load(Ordering::Relaxed),
            recovery_point: self.recovery_point.load(Ordering::Relaxed),
            last_flush_time_millis: self.last_flush_time_millis.load(Ordering::Relaxed),
            oldest_segment_millis: self.oldest_segment_millis.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of `JournalMetrics`, cheap to pass around or log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub messages_written: u64,
    pub messages_read: u64,
    pub write_time_nanos: u64,
    pub read_time_nanos: u64,
    pub uncommitted_messages: i64,
    pub size_bytes: u64,
    pub log_end_offset: i64,
    pub number_of_segments: u64,
    pub unflushed_messages: u64,
    pub recovery_point: i64,
    pub last_flush_time_millis: i64,
    pub oldest_segment_millis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_write_accumulates() {
        let metrics = JournalMetrics::new();
        metrics.record_write(3, 1_000);
        metrics.record_write(2, 500);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_written, 5);
        assert_eq!(snapshot.write_time_nanos, 1_500);
    }
}

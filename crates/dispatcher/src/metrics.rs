//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::SyncEvent;

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Events written, split by kind: video marker, audio marker, sync found
    written: [AtomicU64; 3],
    /// Total write failures
    failure_count: AtomicU64,
    /// Events dropped because the queue was full
    dropped_count: AtomicU64,
}

fn kind_slot(event: &SyncEvent) -> usize {
    match event {
        SyncEvent::VideoMarker(_) => 0,
        SyncEvent::AudioMarker(_) => 1,
        SyncEvent::SyncFound(_) => 2,
    }
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Total events written across all kinds
    pub fn write_count(&self) -> u64 {
        self.written.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Pairings written
    pub fn sync_found_count(&self) -> u64 {
        self.written[2].load(Ordering::Relaxed)
    }

    pub fn record_write(&self, event: &SyncEvent) {
        self.written[kind_slot(event)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            video_markers: self.written[0].load(Ordering::Relaxed),
            audio_markers: self.written[1].load(Ordering::Relaxed),
            sync_found: self.sync_found_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub video_markers: u64,
    pub audio_markers: u64,
    pub sync_found: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

impl MetricsSnapshot {
    pub fn write_count(&self) -> u64 {
        self.video_markers + self.audio_markers + self.sync_found
    }
}

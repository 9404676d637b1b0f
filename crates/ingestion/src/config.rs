//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// What a capture path does when its channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Wait for the consumer (offline generation)
    #[default]
    Block,
    /// Drop the new item, like a live capture device would
    DropNewest,
}

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Channel capacity per path
    pub channel_capacity: usize,

    /// Policy when full
    pub drop_policy: DropPolicy,

    /// Deliver at capture rate instead of as fast as possible
    pub realtime: bool,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            drop_policy: DropPolicy::Block,
            realtime: false,
        }
    }
}

impl BackpressureConfig {
    pub fn new(channel_capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            channel_capacity,
            drop_policy,
            ..Default::default()
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Capture metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Video frames delivered
    pub frames_sent: AtomicU64,

    /// Audio blocks delivered
    pub blocks_sent: AtomicU64,

    /// Items dropped on a full channel
    pub dropped: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("avsync_capture_frames_total").increment(1);
    }

    pub fn record_block(&self) {
        self.blocks_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("avsync_capture_blocks_total").increment(1);
    }

    pub fn record_dropped(&self, path: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("avsync_capture_dropped_total", "path" => path).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub blocks_sent: u64,
    pub dropped: u64,
}

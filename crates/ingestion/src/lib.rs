//! # Ingestion
//!
//! Synthetic capture source for the sync engine.
//!
//! Responsibilities:
//! - Render the marker test pattern as video frames (code, phase A, phase B)
//! - Render the matching tone frames as audio blocks
//! - Report located codes the way an external code reader would
//! - Deliver both paths over bounded async-channels with backpressure
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{BackpressureConfig, SyntheticCapture};
//!
//! let source = SyntheticCapture::new(&config.capture, &config.pattern)?;
//! let streams = source.start(BackpressureConfig::default(), None);
//! while let Ok(frame) = streams.video.recv().await {
//!     // Process frame
//! }
//! ```

mod config;
mod error;
mod pattern;
mod synthetic;

// Re-exports
pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use pattern::{PatternPhase, TestPattern};
pub use synthetic::{CaptureStreams, SyntheticCapture};

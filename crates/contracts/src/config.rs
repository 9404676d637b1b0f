//! RunConfig - Config Loader output
//!
//! Describes a complete measurement run: engine tuning, capture format,
//! test pattern and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::{CaptureFormat, PixelFormat, DEFAULT_INDEX_MODULUS, TYPE_AUDIO_START_AT_SYNC};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Detector tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Capture format
    pub capture: CaptureConfig,

    /// Synthetic test pattern
    #[serde(default)]
    pub pattern: PatternConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl RunConfig {
    pub fn capture_format(&self) -> CaptureFormat {
        self.capture.format()
    }
}

/// Marker detection tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Video sample ring length (even)
    #[validate(range(min = 4, max = 64))]
    pub video_buffer_len: usize,

    /// Video decay range as a multiple of the marker quantization
    #[validate(range(min = 0.5, max = 100.0))]
    pub decay_factor: f64,

    /// Video decay range before any descriptor is known (ms)
    #[validate(range(min = 1, max = 60000))]
    pub default_decay_ms: u64,

    /// Minimum confirmed video score to report
    #[validate(range(min = 0.0))]
    pub video_min_score: f64,

    /// Minimum confirmed preamble score to decode
    #[validate(range(min = 0.0))]
    pub audio_min_score: f64,

    /// Audio channel whose markers are paired with video
    pub sync_channel: usize,

    /// Pending pairing records kept at most
    #[validate(range(min = 1, max = 4096))]
    pub max_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            video_buffer_len: 8,
            decay_factor: 8.0,
            default_decay_ms: 2000,
            video_min_score: 0.02,
            audio_min_score: 0.05,
            sync_channel: 0,
            max_records: 128,
        }
    }
}

/// Capture format
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CaptureConfig {
    #[validate(range(min = 16, max = 8192))]
    pub width: u32,

    #[validate(range(min = 16, max = 8192))]
    pub height: u32,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,

    /// Frame rate numerator
    #[serde(default = "default_fps_num")]
    #[validate(range(min = 1))]
    pub fps_num: u32,

    /// Frame rate denominator
    #[serde(default = "default_fps_den")]
    #[validate(range(min = 1))]
    pub fps_den: u32,

    #[serde(default = "default_sample_rate")]
    #[validate(range(min = 8000, max = 384000))]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    #[validate(range(min = 1, max = 32))]
    pub channels: u16,

    /// Samples per channel in one audio block
    #[serde(default = "default_block_size")]
    #[validate(range(min = 1, max = 65536))]
    pub block_size: usize,
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Nv12
}

fn default_fps_num() -> u32 {
    30
}

fn default_fps_den() -> u32 {
    1
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_block_size() -> usize {
    1024
}

impl CaptureConfig {
    pub fn format(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Timestamp of video frame `n` (ns)
    pub fn frame_ts(&self, n: u64) -> u64 {
        n * 1_000_000_000 * self.fps_den as u64 / self.fps_num as u64
    }

    /// Timestamp of audio sample `n` (ns)
    pub fn sample_ts(&self, n: u64) -> u64 {
        n * 1_000_000_000 / self.sample_rate as u64
    }
}

/// Synthetic marker pattern
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PatternConfig {
    /// Tone carrier (Hz)
    #[validate(range(min = 10, max = 32000))]
    pub frequency: u32,

    /// Carrier cycles per symbol
    #[validate(range(min = 1))]
    pub cycles: u32,

    /// Frames per pattern phase
    #[validate(range(min = 1, max = 300))]
    pub quantization_frames: u32,

    /// `TYPE_*` bits
    #[validate(range(max = 3))]
    pub type_flags: u32,

    #[validate(range(min = 2, max = 65536))]
    pub index_modulus: u32,

    /// Preamble amplitude
    #[validate(range(min = 0.0, max = 1.0))]
    pub amplitude: f64,

    /// Audio marker position relative to the video transition (ns)
    pub audio_delay_ns: i64,

    /// Generated length (s)
    #[validate(range(min = 0.0, max = 86400.0))]
    pub duration_s: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            frequency: 1000,
            cycles: 4,
            quantization_frames: 5,
            type_flags: TYPE_AUDIO_START_AT_SYNC,
            index_modulus: DEFAULT_INDEX_MODULUS,
            amplitude: 0.5,
            audio_delay_ns: 0,
            duration_s: 10.0,
        }
    }
}

impl PatternConfig {
    /// Quantization carried in the payload (ms), rounded to the nearest ms
    pub fn quantization_ms(&self, capture: &CaptureConfig) -> u32 {
        let num = self.quantization_frames as u64 * 1000 * capture.fps_den as u64;
        let den = capture.fps_num as u64;
        ((num + den / 2) / den) as u32
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON-lines file output
    File,
}

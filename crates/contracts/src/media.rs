//! Capture-side inputs: video frames with located codes, audio sample blocks.
//!
//! All timestamps are nanoseconds on the capture clock.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Pixel layout of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Planar luma + interleaved chroma
    Nv12,
    /// Planar 4:2:0
    I420,
    /// Planar 4:4:4
    I444,
    /// Luma only
    Y800,
    /// Packed 4:2:2, luma first
    Yuy2,
    /// Packed 4:2:2, chroma first
    Uyvy,
    Rgba,
    Bgra,
    Bgrx,
}

impl PixelFormat {
    /// Byte step between luma samples and offset of the first one, for
    /// layouts whose first plane carries luma.
    pub fn luma_layout(&self) -> Option<LumaLayout> {
        match self {
            Self::Nv12 | Self::I420 | Self::I444 | Self::Y800 => Some(LumaLayout {
                pixel_size: 1,
                pixel_offset: 0,
            }),
            Self::Yuy2 => Some(LumaLayout {
                pixel_size: 2,
                pixel_offset: 0,
            }),
            Self::Uyvy => Some(LumaLayout {
                pixel_size: 2,
                pixel_offset: 1,
            }),
            Self::Rgba | Self::Bgra | Self::Bgrx => None,
        }
    }
}

/// Position of luma bytes inside plane 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaLayout {
    pub pixel_size: usize,
    pub pixel_offset: usize,
}

/// 2-D point in pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Code located and decoded by the external code reader
///
/// Corners are ordered top-left, top-right, bottom-right, bottom-left as seen
/// in the rendered pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedCode {
    /// Decoded payload text
    pub payload: String,
    /// Four corner positions
    pub corners: [Point; 4],
}

/// One captured video frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Capture timestamp (ns)
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Plane buffers (zero-copy)
    pub planes: Vec<Bytes>,
    /// Bytes per row for each plane
    pub strides: Vec<usize>,
    /// Codes found in this frame
    #[serde(default)]
    pub codes: Vec<DetectedCode>,
}

impl VideoFrame {
    /// Plane 0 and its stride, if the buffer covers the whole frame height
    pub fn primary_plane(&self) -> Option<(&[u8], usize)> {
        let data = self.planes.first()?;
        let stride = *self.strides.first()?;
        if data.len() < stride.checked_mul(self.height as usize)? {
            return None;
        }
        Some((data.as_ref(), stride))
    }
}

/// One block of captured audio
///
/// Samples are planar, one `Vec` per channel, in the range [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBlock {
    /// Timestamp of the first sample (ns)
    pub timestamp: u64,
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// Negotiated capture format, checked before processing starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

//! Video marker extractor.
//!
//! Each frame yields one push-pull brightness sample: luma summed over four
//! disks centred on the last located code's corners, negative for corners 0
//! and 2, positive for corners 1 and 3, normalized by frame area and half the
//! 8-bit range. A ring of samples is split in halves; the second half minus
//! the first is the edge score fed to a [`PeakFinder`].

use std::fmt;

use contracts::{
    CaptureFormat, EngineConfig, LumaLayout, MarkerDescriptor, Point, VideoFrame,
    VideoMarkerEvent,
};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::payload;
use crate::peak::PeakFinder;

const NS_PER_MS: u64 = 1_000_000;
const HALF_LUMA_RANGE: f64 = 127.5;
/// Sample swing below which no sub-frame refinement is attempted
const EDGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct VideoSample {
    ts: u64,
    value: f64,
    /// Descriptor in force when the frame was captured
    descriptor: MarkerDescriptor,
}

/// Finder candidate with its refined edge and the cycle it belongs to
#[derive(Debug, Clone, Copy)]
struct Candidate {
    ts: u64,
    edge: u64,
    descriptor: MarkerDescriptor,
}

/// Result of one processed frame
#[derive(Debug, Default, Clone, Copy)]
pub struct VideoStep {
    /// Valid descriptor decoded from this frame
    pub descriptor: Option<MarkerDescriptor>,
    /// Confirmed transition
    pub event: Option<VideoMarkerEvent>,
}

/// Per-stream video detector state
pub struct VideoMarkerExtractor {
    layout: LumaLayout,
    samples: HeapRb<VideoSample>,
    buffer_len: usize,
    finder: PeakFinder,
    decay_factor: f64,
    min_score: f64,
    descriptor: Option<MarkerDescriptor>,
    corners: Option<[Point; 4]>,
    radius: f32,
    candidate: Option<Candidate>,
}

impl fmt::Debug for VideoMarkerExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoMarkerExtractor")
            .field("buffered", &self.samples.occupied_len())
            .field("buffer_len", &self.buffer_len)
            .field("descriptor", &self.descriptor)
            .field("radius", &self.radius)
            .finish()
    }
}

/// Luma position for a capture format, or the reason it cannot be read
pub fn luma_layout(format: &CaptureFormat) -> Result<LumaLayout> {
    if format.width == 0 || format.height == 0 {
        return Err(SyncError::unsupported_format(format!(
            "empty video frame {}x{}",
            format.width, format.height
        )));
    }
    format.pixel_format.luma_layout().ok_or_else(|| {
        SyncError::unsupported_format(format!(
            "pixel format {:?} has no luma plane",
            format.pixel_format
        ))
    })
}

impl VideoMarkerExtractor {
    pub fn new(format: &CaptureFormat, config: &EngineConfig) -> Result<Self> {
        let layout = luma_layout(format)?;
        let buffer_len = config.video_buffer_len;
        if buffer_len < 4 || buffer_len % 2 != 0 {
            return Err(SyncError::invalid_config(
                "engine.video_buffer_len",
                format!("must be even and at least 4, got {buffer_len}"),
            ));
        }

        Ok(Self {
            layout,
            samples: HeapRb::new(buffer_len),
            buffer_len,
            finder: PeakFinder::new(config.default_decay_ms * NS_PER_MS),
            decay_factor: config.decay_factor,
            min_score: config.video_min_score,
            descriptor: None,
            corners: None,
            radius: 0.0,
            candidate: None,
        })
    }

    /// Most recent valid descriptor
    pub fn descriptor(&self) -> Option<&MarkerDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn finder(&self) -> &PeakFinder {
        &self.finder
    }

    /// Process one frame at `ts` (relative to the pipeline start)
    #[instrument(
        level = "trace",
        name = "video_extractor_process",
        skip(self, frame),
        fields(codes = frame.codes.len())
    )]
    pub fn process(&mut self, frame: &VideoFrame, ts: u64) -> VideoStep {
        let mut step = VideoStep::default();

        for code in &frame.codes {
            let desc = payload::parse(&code.payload);
            if desc.valid {
                self.accept(desc, code.corners);
                step.descriptor = Some(desc);
                break;
            }
            metrics::counter!("avsync_payload_rejected_total").increment(1);
        }

        let (Some(corners), Some(descriptor)) = (self.corners, self.descriptor) else {
            return step;
        };

        let Some(value) = self.sample(frame, &corners) else {
            return step;
        };

        if self.samples.is_full() {
            let _ = self.samples.try_pop();
        }
        let _ = self.samples.try_push(VideoSample {
            ts,
            value,
            descriptor,
        });

        if self.samples.is_full() {
            step.event = self.evaluate();
        }
        step
    }

    fn accept(&mut self, desc: MarkerDescriptor, corners: [Point; 4]) {
        let edge = (corners[0].distance(&corners[1]) + corners[0].distance(&corners[3])) / 2.0;
        self.radius = edge / 4.0;
        self.corners = Some(corners);

        let range_ms = desc.quantization_ms as f64 * self.decay_factor;
        self.finder
            .set_decay_range((range_ms * NS_PER_MS as f64).round() as u64);
        self.descriptor = Some(desc);
    }

    /// Push-pull sample of one frame; `None` for unreadable buffers
    fn sample(&self, frame: &VideoFrame, corners: &[Point; 4]) -> Option<f64> {
        let Some((plane, stride)) = frame.primary_plane() else {
            warn!(ts = frame.timestamp, "video plane shorter than frame, skipped");
            return None;
        };
        let width = frame.width as usize;
        let height = frame.height as usize;
        if width == 0 || height == 0 || stride < width * self.layout.pixel_size {
            warn!(
                ts = frame.timestamp,
                stride, width, "video stride does not cover frame width, skipped"
            );
            return None;
        }

        let mut total = 0.0;
        for (i, corner) in corners.iter().enumerate() {
            let sum = self.disk_sum(plane, stride, width, height, *corner) as f64;
            if i % 2 == 0 {
                total -= sum;
            } else {
                total += sum;
            }
        }
        Some(total / (HALF_LUMA_RANGE * width as f64 * height as f64))
    }

    /// Luma sum over a disk around `center`, clipped to the frame
    fn disk_sum(&self, plane: &[u8], stride: usize, width: usize, height: usize, center: Point) -> u64 {
        let r = self.radius;
        let y_lo = (center.y - r).ceil().max(0.0);
        let y_hi = (center.y + r).floor().min(height as f32 - 1.0);
        if y_hi < y_lo {
            return 0;
        }

        let LumaLayout {
            pixel_size,
            pixel_offset,
        } = self.layout;
        let mut sum = 0u64;
        for y in (y_lo as usize)..=(y_hi as usize) {
            let dy = y as f32 - center.y;
            let dx = (r * r - dy * dy).max(0.0).sqrt();
            let x_lo = (center.x - dx).ceil().max(0.0);
            let x_hi = (center.x + dx).floor().min(width as f32 - 1.0);
            if x_hi < x_lo {
                continue;
            }
            let row = y * stride + pixel_offset;
            for x in (x_lo as usize)..=(x_hi as usize) {
                sum += u64::from(plane[row + x * pixel_size]);
            }
        }
        sum
    }

    /// Score the full ring and feed the peak finder
    fn evaluate(&mut self) -> Option<VideoMarkerEvent> {
        let half = self.buffer_len / 2;
        let mut first = 0.0;
        let mut second = 0.0;
        let (mut ts_first, mut ts_last, mut ts_before, mut ts_at) = (0, 0, 0, 0);
        let (mut lo, mut mid, mut hi) = (0.0, 0.0, 0.0);
        let mut descriptor_at = None;

        for (i, s) in self.samples.iter().enumerate() {
            if i < half {
                first += s.value;
            } else {
                second += s.value;
            }
            if i == 0 {
                ts_first = s.ts;
            }
            if i + 2 == half {
                lo = s.value;
            }
            if i + 1 == half {
                mid = s.value;
                ts_before = s.ts;
            }
            if i == half {
                hi = s.value;
                ts_at = s.ts;
                descriptor_at = Some(s.descriptor);
            }
            ts_last = s.ts;
        }

        let score = second - first;
        let wait_ts = ts_last.saturating_sub(ts_first);
        let confirmed = self.finder.append(score, ts_at, wait_ts);

        if self.finder.candidate().ts == ts_at {
            // the code of the next cycle may already be in the ring
            self.candidate = descriptor_at.map(|descriptor| Candidate {
                ts: ts_at,
                edge: refine_edge(ts_before, ts_at, lo, mid, hi),
                descriptor,
            });
        }
        if !confirmed {
            return None;
        }

        let peak = self.finder.last();
        if peak.score < self.min_score {
            debug!(score = peak.score, ts = peak.ts, "video peak below threshold");
            return None;
        }
        let Some(candidate) = self.candidate.filter(|c| c.ts == peak.ts) else {
            debug!(ts = peak.ts, "video peak without a tracked candidate");
            return None;
        };
        let (timestamp, descriptor) = (candidate.edge, candidate.descriptor);

        metrics::counter!("avsync_video_markers_total").increment(1);
        Some(VideoMarkerEvent {
            timestamp,
            score: peak.score,
            descriptor,
        })
    }
}

/// Place the edge between the two samples straddling the middle of the ring
///
/// `lo` is the last fully old sample, `hi` the first fully new one; `mid`
/// lies in between when the transition happened during its exposure.
fn refine_edge(ts_before: u64, ts_at: u64, lo: f64, mid: f64, hi: f64) -> u64 {
    let span = hi - lo;
    if span.abs() < EDGE_EPSILON || ts_at <= ts_before {
        return ts_at;
    }
    let frac = ((mid - lo) / span).clamp(0.0, 1.0);
    ts_at - ((ts_at - ts_before) as f64 * frac).round() as u64
}

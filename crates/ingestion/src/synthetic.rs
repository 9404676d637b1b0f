//! Synthetic capture source
//!
//! 生成带同步标记的视频帧与音频块，用于无采集设备的测试。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use bytes::Bytes;
use contracts::{
    AudioBlock, CaptureConfig, DetectedCode, PatternConfig, PixelFormat, VideoFrame,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::config::{BackpressureConfig, DropPolicy, IngestionMetrics};
use crate::error::{IngestionError, Result};
use crate::pattern::{PatternPhase, TestPattern};

const CODE_GREY: u8 = 128;
const CHROMA_NEUTRAL: u8 = 128;

/// Rendered planes of one pattern phase
#[derive(Debug, Clone)]
struct PhaseImage {
    planes: Vec<Bytes>,
    strides: Vec<usize>,
}

/// Receivers of a started capture
#[derive(Debug)]
pub struct CaptureStreams {
    pub video: Receiver<VideoFrame>,
    pub audio: Receiver<AudioBlock>,
    pub video_task: JoinHandle<()>,
    pub audio_task: JoinHandle<()>,
}

/// Synthetic marker capture
///
/// Frames and blocks are produced on demand; clones share the rendered
/// images and the running flag.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    pattern: Arc<TestPattern>,
    /// Code, phase A, phase B
    images: Arc<[PhaseImage; 3]>,
    running: Arc<AtomicBool>,
}

impl SyntheticCapture {
    pub fn new(capture: &CaptureConfig, pattern: &PatternConfig) -> Result<Self> {
        let pattern = TestPattern::new(capture, pattern)?;
        let images = [
            PatternPhase::Code,
            PatternPhase::PhaseA,
            PatternPhase::PhaseB,
        ]
        .map(|phase| render_planes(capture, phase));
        let [code, a, b] = images;

        Ok(Self {
            pattern: Arc::new(pattern),
            images: Arc::new([code?, a?, b?]),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pattern(&self) -> &TestPattern {
        &self.pattern
    }

    /// Frame `n` of the stream, `None` past the end
    pub fn video_frame(&self, n: u64) -> Option<VideoFrame> {
        if n >= self.pattern.frame_count() {
            return None;
        }
        let capture = self.pattern.capture();
        let phase = self.pattern.phase_of(n);
        let image = match phase {
            PatternPhase::Code => &self.images[0],
            PatternPhase::PhaseA => &self.images[1],
            PatternPhase::PhaseB => &self.images[2],
        };
        let codes = if phase == PatternPhase::Code {
            vec![DetectedCode {
                payload: self.pattern.payload(self.pattern.cycle_of(n)),
                corners: self.pattern.code_corners(),
            }]
        } else {
            Vec::new()
        };

        Some(VideoFrame {
            timestamp: capture.frame_ts(n),
            width: capture.width,
            height: capture.height,
            format: capture.pixel_format,
            planes: image.planes.clone(),
            strides: image.strides.clone(),
            codes,
        })
    }

    /// Block `k` of the stream, `None` past the end
    pub fn audio_block(&self, k: u64) -> Option<AudioBlock> {
        let capture = self.pattern.capture();
        let first = k * capture.block_size as u64;
        let total = self.pattern.sample_count();
        if first >= total {
            return None;
        }
        let len = (total - first).min(capture.block_size as u64) as usize;
        let mut samples = vec![0.0; len];
        self.pattern.render_audio(first, &mut samples);

        Some(AudioBlock {
            timestamp: capture.sample_ts(first),
            sample_rate: capture.sample_rate,
            channels: vec![samples; usize::from(capture.channels)],
        })
    }

    pub fn video_frames(&self) -> impl Iterator<Item = VideoFrame> + '_ {
        (0..).map_while(|n| self.video_frame(n))
    }

    pub fn audio_blocks(&self) -> impl Iterator<Item = AudioBlock> + '_ {
        (0..).map_while(|k| self.audio_block(k))
    }

    /// Stream frames and blocks on two tasks over bounded channels
    ///
    /// Channels close once the stream ends or [`SyntheticCapture::stop`] is
    /// called.
    pub fn start(
        &self,
        config: BackpressureConfig,
        metrics: Option<Arc<IngestionMetrics>>,
    ) -> CaptureStreams {
        let metrics = metrics.unwrap_or_else(|| Arc::new(IngestionMetrics::new()));
        let (video_tx, video_rx) = bounded(config.channel_capacity);
        let (audio_tx, audio_rx) = bounded(config.channel_capacity);

        self.running.store(true, Ordering::SeqCst);
        info!(
            frames = self.pattern.frame_count(),
            samples = self.pattern.sample_count(),
            cycles = self.pattern.cycle_count(),
            realtime = config.realtime,
            "synthetic capture started"
        );

        let video_task = {
            let capture = self.clone();
            let config = config.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let frames = capture.video_frames().map(|f| (f.timestamp, f));
                deliver("video", frames, video_tx, &config, &capture.running, || {
                    metrics.record_frame()
                }, &metrics)
                .await;
            })
        };

        let audio_task = {
            let capture = self.clone();
            tokio::spawn(async move {
                let blocks = capture.audio_blocks().map(|b| (b.timestamp, b));
                deliver("audio", blocks, audio_tx, &config, &capture.running, || {
                    metrics.record_block()
                }, &metrics)
                .await;
            })
        };

        CaptureStreams {
            video: video_rx,
            audio: audio_rx,
            video_task,
            audio_task,
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Push timestamped items into `tx` following the backpressure policy
async fn deliver<T, I, F>(
    path: &'static str,
    items: I,
    tx: Sender<T>,
    config: &BackpressureConfig,
    running: &AtomicBool,
    on_sent: F,
    metrics: &IngestionMetrics,
) where
    I: Iterator<Item = (u64, T)>,
    F: Fn(),
{
    let origin = tokio::time::Instant::now();
    let mut sent = 0u64;

    for (ts, item) in items {
        if !running.load(Ordering::Relaxed) {
            debug!(path, "capture stopped");
            break;
        }
        if config.realtime {
            tokio::time::sleep_until(origin + Duration::from_nanos(ts)).await;
        }

        match config.drop_policy {
            DropPolicy::Block => {
                if tx.send(item).await.is_err() {
                    debug!(path, "capture channel closed");
                    break;
                }
            }
            DropPolicy::DropNewest => match tx.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics.record_dropped(path);
                    trace!(path, ts, "capture item dropped (newest)");
                    continue;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(path, "capture channel closed");
                    break;
                }
            },
        }
        on_sent();
        sent += 1;
    }

    debug!(path, sent, "capture path finished");
}

/// Render one pattern phase in the capture's pixel format
fn render_planes(capture: &CaptureConfig, phase: PatternPhase) -> Result<PhaseImage> {
    let format = capture.pixel_format;
    let layout = format
        .luma_layout()
        .ok_or(IngestionError::UnsupportedFormat { format })?;
    let (w, h) = (capture.width as usize, capture.height as usize);
    let lit = phase.lit_quadrants();

    let luma_stride = match format {
        PixelFormat::Yuy2 | PixelFormat::Uyvy => w.div_ceil(2) * 4,
        _ => w,
    };
    let mut luma = vec![CHROMA_NEUTRAL; luma_stride * h];
    for y in 0..h {
        for x in 0..w {
            let value = match lit {
                None => CODE_GREY,
                Some(quadrants) => {
                    let quadrant = match (x < w / 2, y < h / 2) {
                        (true, true) => 0,
                        (false, true) => 1,
                        (false, false) => 2,
                        (true, false) => 3,
                    };
                    if quadrants[quadrant] {
                        255
                    } else {
                        0
                    }
                }
            };
            luma[y * luma_stride + layout.pixel_offset + x * layout.pixel_size] = value;
        }
    }

    let mut planes = vec![Bytes::from(luma)];
    let mut strides = vec![luma_stride];
    let chroma = |stride: usize, rows: usize| Bytes::from(vec![CHROMA_NEUTRAL; stride * rows]);
    match format {
        PixelFormat::Nv12 => {
            let stride = w.div_ceil(2) * 2;
            planes.push(chroma(stride, h.div_ceil(2)));
            strides.push(stride);
        }
        PixelFormat::I420 => {
            let stride = w.div_ceil(2);
            for _ in 0..2 {
                planes.push(chroma(stride, h.div_ceil(2)));
                strides.push(stride);
            }
        }
        PixelFormat::I444 => {
            for _ in 0..2 {
                planes.push(chroma(w, h));
                strides.push(w);
            }
        }
        _ => {}
    }

    Ok(PhaseImage { planes, strides })
}

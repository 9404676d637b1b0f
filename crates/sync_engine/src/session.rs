//! Measurement session: the video and audio delivery paths around the
//! shared state.
//!
//! A session can be driven from one thread through [`SyncSession`], or split
//! into a [`VideoPath`] and an [`AudioPath`] that run on separate threads or
//! tasks. Each path owns its detectors; only the oscillator parameters, the
//! start timestamp and the matcher are shared.

use contracts::tone::ToneGeometry;
use contracts::{
    AudioBlock, CaptureFormat, EngineConfig, MarkerSide, SyncEvent, VideoFrame,
    TYPE_AUDIO_START_AT_SYNC,
};
use tracing::{debug, info, instrument, warn};

use crate::audio::ToneDemodulator;
use crate::error::{Result, SyncError};
use crate::shared::{OscillatorParams, SharedState};
use crate::video::VideoMarkerExtractor;

/// Video delivery path
#[derive(Debug)]
pub struct VideoPath {
    shared: SharedState,
    extractor: VideoMarkerExtractor,
}

impl VideoPath {
    /// Process one frame and return the events it produced
    #[instrument(
        level = "trace",
        name = "video_path_frame",
        skip(self, frame),
        fields(ts = frame.timestamp)
    )]
    pub fn process_frame(&mut self, frame: &VideoFrame) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        let start = self.shared.start_at(frame.timestamp);
        let Some(ts) = frame.timestamp.checked_sub(start) else {
            warn!(ts = frame.timestamp, start, "video frame before pipeline start, skipped");
            return events;
        };

        let step = self.extractor.process(frame, ts);

        if let Some(desc) = step.descriptor {
            if let Some(params) = self.shared.publish(&desc) {
                info!(
                    frequency_hz = params.frequency_hz,
                    cycles = params.cycles_per_symbol,
                    quantization_ms = params.quantization_ms,
                    type_flags = params.type_flags,
                    index_modulus = params.index_modulus,
                    "marker parameters updated"
                );
            }
        }

        if let Some(event) = step.event {
            debug!(
                ts = event.timestamp,
                index = event.descriptor.index,
                score = event.score,
                "video marker found"
            );
            events.push(SyncEvent::VideoMarker(event));
            if let Some(found) =
                self.shared
                    .match_marker(MarkerSide::Video, event.descriptor.index, event.timestamp)
            {
                metrics::counter!("avsync_sync_found_total").increment(1);
                events.push(SyncEvent::SyncFound(found));
            }
        }
        events
    }

    pub fn extractor(&self) -> &VideoMarkerExtractor {
        &self.extractor
    }
}

/// Audio delivery path
#[derive(Debug)]
pub struct AudioPath {
    shared: SharedState,
    sample_rate: u32,
    channels: usize,
    sync_channel: usize,
    min_score: f64,
    /// Generation of the parameters the demodulators were built for
    generation: Option<u64>,
    /// Tone geometry and start-at-sync flag of the current demodulators
    tone: Option<(ToneGeometry, bool)>,
    demodulators: Vec<ToneDemodulator>,
}

impl AudioPath {
    /// Process one block and return the events it produced
    #[instrument(
        level = "trace",
        name = "audio_path_block",
        skip(self, block),
        fields(ts = block.timestamp, frames = block.frames())
    )]
    pub fn process_block(&mut self, block: &AudioBlock) -> Vec<SyncEvent> {
        let mut events = Vec::new();

        let snapshot = self.shared.snapshot();
        let (Some(params), Some(start)) = (snapshot.params, snapshot.start_ts) else {
            return events;
        };
        if block.sample_rate != self.sample_rate {
            warn!(
                expected = self.sample_rate,
                got = block.sample_rate,
                "audio block sample rate mismatch, skipped"
            );
            return events;
        }
        self.reconfigure(&params);

        let frames = block.frames();
        for demod in &mut self.demodulators {
            let channel = demod.channel();
            let Some(samples) = block.channels.get(channel) else {
                continue;
            };
            let geometry = *demod.geometry();
            for (i, x) in samples.iter().take(frames).enumerate() {
                let abs_ts = block.timestamp + geometry.samples_to_ns(i);
                let Some(rel_ts) = abs_ts.checked_sub(start) else {
                    continue;
                };
                let Some(event) = demod.push_sample(*x, abs_ts, rel_ts) else {
                    continue;
                };

                debug!(
                    channel,
                    ts = event.timestamp,
                    index = event.index,
                    score = event.score,
                    "audio marker found"
                );
                events.push(SyncEvent::AudioMarker(event));
                if channel == self.sync_channel {
                    if let Some(found) =
                        self.shared
                            .match_marker(MarkerSide::Audio, event.index, event.timestamp)
                    {
                        metrics::counter!("avsync_sync_found_total").increment(1);
                        events.push(SyncEvent::SyncFound(found));
                    }
                }
            }
        }
        events
    }

    /// Rebuild demodulators when the tone settings changed
    fn reconfigure(&mut self, params: &OscillatorParams) {
        if self.generation == Some(params.generation) {
            return;
        }
        self.generation = Some(params.generation);

        let Some(geometry) = ToneGeometry::new(
            params.frequency_hz,
            params.cycles_per_symbol,
            self.sample_rate,
            params.type_flags,
        ) else {
            warn!(
                frequency_hz = params.frequency_hz,
                cycles = params.cycles_per_symbol,
                sample_rate = self.sample_rate,
                "tone symbol shorter than one sample, audio detection paused"
            );
            self.demodulators.clear();
            self.tone = None;
            return;
        };

        let tone = (geometry, params.type_flags & TYPE_AUDIO_START_AT_SYNC != 0);
        if self.tone == Some(tone) && !self.demodulators.is_empty() {
            for demod in &mut self.demodulators {
                demod.set_index_modulus(params.index_modulus);
            }
            return;
        }
        self.tone = Some(tone);

        let discarded: usize = self.demodulators.iter().map(ToneDemodulator::buffered).sum();
        debug!(
            symbol_len = geometry.symbol_len,
            modulation = ?geometry.modulation,
            discarded,
            "audio demodulators reset for new tone settings"
        );
        self.demodulators = (0..self.channels)
            .map(|ch| {
                ToneDemodulator::new(
                    ch,
                    geometry,
                    params.type_flags,
                    params.index_modulus,
                    self.min_score,
                )
            })
            .collect();
    }
}

/// Both paths of a session driven from a single caller
#[derive(Debug)]
pub struct SyncSession {
    video: VideoPath,
    audio: AudioPath,
}

impl SyncSession {
    /// Validate the capture format and build both paths
    ///
    /// # Errors
    /// `UnsupportedFormat` for pixel layouts without a luma plane, empty
    /// frames or audio without samples; `InvalidConfig` for engine settings
    /// the detectors cannot work with.
    pub fn new(config: &EngineConfig, format: &CaptureFormat) -> Result<Self> {
        if format.sample_rate == 0 {
            return Err(SyncError::unsupported_format("audio sample rate is zero"));
        }
        if format.channels == 0 {
            return Err(SyncError::unsupported_format("no audio channels"));
        }
        if config.sync_channel >= format.channels as usize {
            return Err(SyncError::invalid_config(
                "engine.sync_channel",
                format!(
                    "channel {} out of range for {} channels",
                    config.sync_channel, format.channels
                ),
            ));
        }

        let extractor = VideoMarkerExtractor::new(format, config)?;
        let shared = SharedState::new(config.max_records);

        info!(
            width = format.width,
            height = format.height,
            pixel_format = ?format.pixel_format,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "sync session started"
        );

        Ok(Self {
            video: VideoPath {
                shared: shared.clone(),
                extractor,
            },
            audio: AudioPath {
                shared,
                sample_rate: format.sample_rate,
                channels: format.channels as usize,
                sync_channel: config.sync_channel,
                min_score: config.audio_min_score,
                generation: None,
                tone: None,
                demodulators: Vec::new(),
            },
        })
    }

    pub fn process_video(&mut self, frame: &VideoFrame) -> Vec<SyncEvent> {
        self.video.process_frame(frame)
    }

    pub fn process_audio(&mut self, block: &AudioBlock) -> Vec<SyncEvent> {
        self.audio.process_block(block)
    }

    pub fn shared(&self) -> &SharedState {
        &self.video.shared
    }

    /// Separate the paths for concurrent delivery
    pub fn split(self) -> (VideoPath, AudioPath) {
        (self.video, self.audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::tone::{encode_codeword, Modulation};
    use contracts::{DetectedCode, PixelFormat, Point};

    const W: u32 = 64;
    const H: u32 = 64;
    const FRAME_NS: u64 = 33_333_333;
    const RATE: u32 = 48_000;

    fn format() -> CaptureFormat {
        CaptureFormat {
            width: W,
            height: H,
            pixel_format: PixelFormat::Y800,
            sample_rate: RATE,
            channels: 1,
        }
    }

    /// Y800 frame with two diagonal quadrants lit
    fn frame(n: u64, flipped: bool, codes: Vec<DetectedCode>) -> VideoFrame {
        let luma: Vec<u8> = (0..W * H)
            .map(|i| {
                let (x, y) = (i % W, i / W);
                let main_diagonal = (x < W / 2) == (y < H / 2);
                if main_diagonal != flipped {
                    255
                } else {
                    0
                }
            })
            .collect();
        VideoFrame {
            timestamp: n * FRAME_NS,
            width: W,
            height: H,
            format: PixelFormat::Y800,
            planes: vec![Bytes::from(luma)],
            strides: vec![W as usize],
            codes,
        }
    }

    fn code(index: u32) -> DetectedCode {
        DetectedCode {
            payload: format!("f=1000,c=4,q=100,t=1,i={index}"),
            corners: [
                Point::new(16.0, 16.0),
                Point::new(48.0, 16.0),
                Point::new(48.0, 48.0),
                Point::new(16.0, 48.0),
            ],
        }
    }

    /// One block holding a BPSK frame for `index` starting at sample `start`
    fn tone_block(index: u32, start: usize, total: usize) -> AudioBlock {
        let geometry = ToneGeometry::new(1000, 4, RATE, TYPE_AUDIO_START_AT_SYNC).unwrap();
        let symbols = Modulation::Bpsk.split_codeword(encode_codeword(index, Modulation::Bpsk));
        let samples = (0..total)
            .map(|n| {
                if n < start {
                    return 0.0;
                }
                geometry.render_sample(&symbols, n - start, geometry.samples_to_ns(n), 0.5) as f32
            })
            .collect();
        AudioBlock {
            timestamp: 0,
            sample_rate: RATE,
            channels: vec![samples],
        }
    }

    fn run_video(session: &mut SyncSession, index: u32) -> Vec<SyncEvent> {
        (0..30u64)
            .flat_map(|n| {
                let codes = if n < 3 { vec![code(index)] } else { vec![] };
                session.process_video(&frame(n, n >= 12, codes))
            })
            .collect()
    }

    #[test]
    fn test_rejects_sync_channel_out_of_range() {
        let config = EngineConfig {
            sync_channel: 1,
            ..EngineConfig::default()
        };
        let err = SyncSession::new(&config, &format()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { .. }));
    }

    #[test]
    fn test_audio_ignored_before_parameters() {
        let mut session = SyncSession::new(&EngineConfig::default(), &format()).unwrap();
        let events = session.process_audio(&tone_block(42, 1_000, 8_000));
        assert!(events.is_empty());
        assert!(session.shared().snapshot().params.is_none());
    }

    #[test]
    fn test_pairs_video_and_audio_markers() {
        let mut session = SyncSession::new(&EngineConfig::default(), &format()).unwrap();
        let video = run_video(&mut session, 42);
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].kind(), "video_marker");

        // video edge at 12 * FRAME_NS, tone starts on the next sample
        let audio = session.process_audio(&tone_block(42, 19_200, 24_000));
        assert_eq!(audio.len(), 2);
        let SyncEvent::SyncFound(found) = audio[1] else {
            panic!("expected sync_found, got {:?}", audio[1]);
        };
        assert_eq!(found.index, 42);
        assert_eq!(found.video_ts, 12 * FRAME_NS);
        assert!(found.latency_ns().abs() < 1_000);
        assert_eq!(session.shared().pending_records(), 0);
    }

    #[test]
    fn test_split_paths_share_matcher() {
        let session = SyncSession::new(&EngineConfig::default(), &format()).unwrap();
        let (mut video, mut audio) = session.split();
        let events: Vec<_> = (0..30u64)
            .flat_map(|n| {
                let codes = if n < 3 { vec![code(7)] } else { vec![] };
                video.process_frame(&frame(n, n >= 12, codes))
            })
            .collect();
        assert_eq!(events.len(), 1);
        assert!(video.extractor().descriptor().is_some());

        let events = audio.process_block(&tone_block(7, 19_200, 24_000));
        assert!(events
            .iter()
            .any(|e| matches!(e, SyncEvent::SyncFound(f) if f.index == 7)));
    }

    fn coded_frame(n: u64, payload: &str) -> VideoFrame {
        let mut coded = code(0);
        coded.payload = payload.to_string();
        frame(n, false, vec![coded])
    }

    fn constant_block(ts: u64, len: usize) -> AudioBlock {
        AudioBlock {
            timestamp: ts,
            sample_rate: RATE,
            channels: vec![vec![0.25; len]],
        }
    }

    #[test]
    fn test_tone_change_rebuilds_demodulators() {
        let mut session = SyncSession::new(&EngineConfig::default(), &format()).unwrap();
        session.process_video(&coded_frame(0, "f=1000,c=4,q=100,t=1,i=1"));
        session.process_audio(&tone_block(1, 0, 1_440));
        assert_eq!(session.audio.generation, Some(0));
        assert_eq!(session.audio.demodulators[0].geometry().symbol_len, 192);
        assert_eq!(session.audio.demodulators[0].buffered(), 1_440 - 191);

        // new carrier: history from the old oscillator is dropped
        session.process_video(&coded_frame(1, "f=2000,c=4,q=100,t=1,i=2"));
        session.process_audio(&constant_block(0, 0));
        assert_eq!(session.audio.generation, Some(1));
        assert_eq!(session.audio.demodulators[0].geometry().symbol_len, 96);
        assert_eq!(session.audio.demodulators[0].buffered(), 0);

        session.process_audio(&constant_block(0, 1_000));
        assert_eq!(session.audio.demodulators[0].buffered(), 1_000 - 95);

        // quantization and modulus only: same tone, history kept
        session.process_video(&coded_frame(2, "f=2000,c=4,q=200,t=1,i=3,I=128"));
        session.process_audio(&constant_block(0, 0));
        assert_eq!(session.audio.generation, Some(2));
        assert_eq!(session.audio.demodulators[0].geometry().symbol_len, 96);
        assert_eq!(session.audio.demodulators[0].buffered(), 1_000 - 95);

        // index alone never bumps the generation
        session.process_video(&coded_frame(3, "f=2000,c=4,q=200,t=1,i=4,I=128"));
        session.process_audio(&constant_block(0, 0));
        assert_eq!(session.audio.generation, Some(2));
    }
}

//! Test pattern timing.
//!
//! One cycle is `3q` frames: `q` frames showing the code, `q` frames of
//! phase A, `q` frames of phase B. The A to B switch of cycle `c` is the video
//! marker and the tone frame of cycle `c` carries the same index, `c mod M`.

use contracts::tone::{encode_codeword, ToneGeometry};
use contracts::{CaptureConfig, PatternConfig, Point, TYPE_AUDIO_START_AT_SYNC, TYPE_QPSK};

use crate::error::{IngestionError, Result};

const NS_PER_SEC: i128 = 1_000_000_000;

/// What a frame shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternPhase {
    /// Mid grey with the code
    Code,
    /// Top-left and bottom-right quadrants white
    PhaseA,
    /// Top-right and bottom-left quadrants white
    PhaseB,
}

impl PatternPhase {
    /// Lit quadrants in corner order: top-left, top-right, bottom-right,
    /// bottom-left. `None` for the uniform code frame.
    pub fn lit_quadrants(&self) -> Option<[bool; 4]> {
        match self {
            Self::Code => None,
            Self::PhaseA => Some([true, false, true, false]),
            Self::PhaseB => Some([false, true, false, true]),
        }
    }
}

/// Timing of a synthetic marker stream
#[derive(Debug, Clone)]
pub struct TestPattern {
    capture: CaptureConfig,
    quantization_frames: u64,
    quantization_ms: u32,
    frequency: u32,
    cycles: u32,
    type_flags: u32,
    index_modulus: u32,
    amplitude: f64,
    audio_delay_ns: i64,
    geometry: ToneGeometry,
    frame_count: u64,
    sample_count: u64,
}

impl TestPattern {
    pub fn new(capture: &CaptureConfig, pattern: &PatternConfig) -> Result<Self> {
        if capture.pixel_format.luma_layout().is_none() {
            return Err(IngestionError::UnsupportedFormat {
                format: capture.pixel_format,
            });
        }
        if capture.fps_num == 0 || capture.fps_den == 0 || pattern.quantization_frames == 0 {
            return Err(IngestionError::invalid_pattern(
                "frame rate and quantization must be positive",
            ));
        }
        if !(2..=1 << 16).contains(&pattern.index_modulus) {
            return Err(IngestionError::invalid_pattern(format!(
                "index modulus {} out of range",
                pattern.index_modulus
            )));
        }
        if pattern.type_flags & TYPE_QPSK == 0 && pattern.index_modulus > 256 {
            return Err(IngestionError::invalid_pattern(format!(
                "index modulus {} needs QPSK tone frames",
                pattern.index_modulus
            )));
        }

        let geometry = ToneGeometry::new(
            pattern.frequency,
            pattern.cycles,
            capture.sample_rate,
            pattern.type_flags,
        )
        .ok_or_else(|| {
            IngestionError::invalid_pattern(format!(
                "{} cycles at {} Hz span no samples at {} Hz",
                pattern.cycles, pattern.frequency, capture.sample_rate
            ))
        })?;

        let q = u64::from(pattern.quantization_frames);
        let tone_ns = geometry.samples_to_ns(geometry.frame_len());
        let marker_ns = capture.frame_ts(2 * q);
        if tone_ns > marker_ns {
            return Err(IngestionError::invalid_pattern(format!(
                "tone frame lasts {tone_ns} ns but the video marker only {marker_ns} ns"
            )));
        }

        let frame_count = (pattern.duration_s * f64::from(capture.fps_num)
            / f64::from(capture.fps_den))
        .floor() as u64;
        let sample_count = (pattern.duration_s * f64::from(capture.sample_rate)).floor() as u64;

        Ok(Self {
            capture: capture.clone(),
            quantization_frames: q,
            quantization_ms: pattern.quantization_ms(capture),
            frequency: pattern.frequency,
            cycles: pattern.cycles,
            type_flags: pattern.type_flags,
            index_modulus: pattern.index_modulus,
            amplitude: pattern.amplitude,
            audio_delay_ns: pattern.audio_delay_ns,
            geometry,
            frame_count,
            sample_count,
        })
    }

    pub fn capture(&self) -> &CaptureConfig {
        &self.capture
    }

    pub fn geometry(&self) -> &ToneGeometry {
        &self.geometry
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn cycle_frames(&self) -> u64 {
        3 * self.quantization_frames
    }

    pub fn cycle_of(&self, frame: u64) -> u64 {
        frame / self.cycle_frames()
    }

    pub fn phase_of(&self, frame: u64) -> PatternPhase {
        match (frame % self.cycle_frames()) / self.quantization_frames {
            0 => PatternPhase::Code,
            1 => PatternPhase::PhaseA,
            _ => PatternPhase::PhaseB,
        }
    }

    /// Marker index of a cycle
    pub fn index(&self, cycle: u64) -> u32 {
        (cycle % u64::from(self.index_modulus)) as u32
    }

    /// Payload text of the code shown in a cycle
    pub fn payload(&self, cycle: u64) -> String {
        format!(
            "q={},i={},f={},c={},t={},I={}",
            self.quantization_ms,
            self.index(cycle),
            self.frequency,
            self.cycles,
            self.type_flags,
            self.index_modulus
        )
    }

    /// Corners of the largest centred square
    pub fn code_corners(&self) -> [Point; 4] {
        let (w, h) = (self.capture.width as f32, self.capture.height as f32);
        let size = w.min(h);
        let x0 = (w - size) / 2.0;
        let y0 = (h - size) / 2.0;
        [
            Point::new(x0, y0),
            Point::new(x0 + size, y0),
            Point::new(x0 + size, y0 + size),
            Point::new(x0, y0 + size),
        ]
    }

    /// First frame of phase B in a cycle
    pub fn transition_frame(&self, cycle: u64) -> u64 {
        cycle * self.cycle_frames() + 2 * self.quantization_frames
    }

    pub fn transition_ts(&self, cycle: u64) -> u64 {
        self.capture.frame_ts(self.transition_frame(cycle))
    }

    /// Cycles whose transition lies inside the generated frames
    pub fn cycle_count(&self) -> u64 {
        let first = 2 * self.quantization_frames;
        if self.frame_count <= first {
            return 0;
        }
        (self.frame_count - first - 1) / self.cycle_frames() + 1
    }

    /// First sample of a cycle's tone frame, `None` if it would start before
    /// the capture does
    pub fn tone_start_sample(&self, cycle: u64) -> Option<u64> {
        let starts_at_sync = self.type_flags & TYPE_AUDIO_START_AT_SYNC != 0;
        let start_ns = i128::from(self.transition_ts(cycle)) + i128::from(self.audio_delay_ns)
            - i128::from(self.geometry.marker_offset_ns(starts_at_sync));
        if start_ns < 0 {
            return None;
        }
        let rate = i128::from(self.capture.sample_rate);
        u64::try_from((start_ns * rate + NS_PER_SEC - 1) / NS_PER_SEC).ok()
    }

    /// Render the tone signal for samples `first..first + out.len()`
    pub fn render_audio(&self, first: u64, out: &mut [f32]) {
        out.fill(0.0);
        let last = first + out.len() as u64;
        let frame_len = self.geometry.frame_len() as u64;
        let modulation = self.geometry.modulation;

        let cycle_ns = self.capture.frame_ts(self.cycle_frames()).max(1);
        let slack_ns = self.geometry.samples_to_ns(self.geometry.frame_len())
            + self.audio_delay_ns.unsigned_abs()
            + self.capture.frame_ts(self.cycle_frames());
        let mut cycle = (self.capture.sample_ts(first).saturating_sub(slack_ns) / cycle_ns)
            .saturating_sub(1);

        while cycle < self.cycle_count() {
            let Some(start) = self.tone_start_sample(cycle) else {
                cycle += 1;
                continue;
            };
            if start >= last {
                break;
            }
            let end = start + frame_len;
            if end > first {
                let symbols =
                    modulation.split_codeword(encode_codeword(self.index(cycle), modulation));
                for n in start.max(first)..end.min(last) {
                    let value = self.geometry.render_sample(
                        &symbols,
                        (n - start) as usize,
                        self.capture.sample_ts(n),
                        self.amplitude,
                    );
                    out[(n - first) as usize] += value as f32;
                }
            }
            cycle += 1;
        }
    }
}

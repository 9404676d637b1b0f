//! Audio tone demodulator.
//!
//! Every sample is mixed down with a local oscillator at the carrier
//! frequency and summed over one symbol length. Each window sum (a "tap")
//! is the complex amplitude of the symbol ending at that sample. Three taps
//! one symbol apart score the `[0, π, 0]` preamble; after the peak finder
//! confirms the lock, data taps are rotated by the preamble phase and sliced.

use contracts::tone::{decode_codeword, oscillator_phase, ToneGeometry, PREAMBLE_SYMBOLS};
use contracts::{AudioMarkerEvent, TYPE_AUDIO_START_AT_SYNC};
use num_complex::Complex64;
use tracing::{debug, trace};

use crate::peak::PeakFinder;
use crate::sliding::{SlidingSum, TapHistory};

/// Extra symbol lengths kept in the tap history beyond the data span
const HISTORY_MARGIN_SYMBOLS: usize = 6;
/// Trailing symbol lengths covered by the decay range
const DECAY_GUARD_SYMBOLS: usize = 2;

/// Demodulator for one audio channel
#[derive(Debug)]
pub struct ToneDemodulator {
    channel: usize,
    geometry: ToneGeometry,
    starts_at_sync: bool,
    index_modulus: u32,
    min_score: f64,
    sliding: SlidingSum<Complex64>,
    taps: TapHistory<Complex64>,
    finder: PeakFinder,
    /// Tap sequence number of the finder's current candidate
    candidate_seq: Option<u64>,
    /// Preamble length (ns)
    wait_ns: u64,
    /// From the first preamble sample to the last one (ns)
    preamble_span_ns: u64,
    markers_total: metrics::Counter,
}

impl ToneDemodulator {
    pub fn new(
        channel: usize,
        geometry: ToneGeometry,
        type_flags: u32,
        index_modulus: u32,
        min_score: f64,
    ) -> Self {
        let l = geometry.symbol_len;
        let data_len = geometry.data_symbols() * l;
        let decay_symbols = PREAMBLE_SYMBOLS + geometry.data_symbols() + DECAY_GUARD_SYMBOLS;

        Self {
            channel,
            geometry,
            starts_at_sync: type_flags & TYPE_AUDIO_START_AT_SYNC != 0,
            index_modulus,
            min_score,
            sliding: SlidingSum::new(l),
            taps: TapHistory::new(data_len + HISTORY_MARGIN_SYMBOLS * l),
            finder: PeakFinder::new(geometry.samples_to_ns(2 * decay_symbols * l)),
            candidate_seq: None,
            wait_ns: geometry.samples_to_ns(PREAMBLE_SYMBOLS * l),
            preamble_span_ns: geometry.samples_to_ns(PREAMBLE_SYMBOLS * l - 1),
            markers_total: metrics::counter!(
                "avsync_audio_markers_total",
                "channel" => channel.to_string()
            ),
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn geometry(&self) -> &ToneGeometry {
        &self.geometry
    }

    /// Correlator taps currently held
    pub fn buffered(&self) -> usize {
        self.taps.len()
    }

    pub fn set_index_modulus(&mut self, index_modulus: u32) {
        self.index_modulus = index_modulus;
    }

    /// Drop all accumulated samples
    pub fn reset(&mut self) {
        self.sliding.clear();
        self.taps.clear();
        self.finder.reset();
        self.candidate_seq = None;
    }

    /// Feed one sample. `abs_ts` drives the oscillator, `rel_ts` is the
    /// pipeline-relative time used for events.
    #[inline]
    pub fn push_sample(&mut self, x: f32, abs_ts: u64, rel_ts: u64) -> Option<AudioMarkerEvent> {
        let theta = oscillator_phase(self.geometry.frequency_hz, abs_ts);
        let mixed = Complex64::from_polar(f64::from(x), -theta);
        let window = self.sliding.push(mixed)?;
        let newest = self.taps.push(window, rel_ts);

        let l = self.geometry.symbol_len as u64;
        let data_len = self.geometry.data_symbols() as u64 * l;
        let m = newest.checked_sub(data_len)?;
        let p2 = *self.taps.get(m)?;
        let p1 = self.taps.get(m.checked_sub(l)?)?.value;
        let p0 = self.taps.get(m.checked_sub(2 * l)?)?.value;

        let score = (p0 - p1 * 2.0 + p2.value).norm() / (2.0 * l as f64);
        let confirmed = self.finder.append(score, p2.ts, self.wait_ns);
        if self.finder.candidate().ts == p2.ts {
            self.candidate_seq = Some(m);
        }

        if confirmed {
            self.decode()
        } else {
            None
        }
    }

    /// Read the codeword following the confirmed preamble
    fn decode(&mut self) -> Option<AudioMarkerEvent> {
        let peak = self.finder.last();
        if peak.score < self.min_score {
            debug!(
                channel = self.channel,
                score = peak.score,
                "preamble peak below threshold"
            );
            return None;
        }

        let Some(k) = self
            .candidate_seq
            .filter(|seq| self.taps.get(*seq).is_some_and(|t| t.ts == peak.ts))
        else {
            trace!(channel = self.channel, ts = peak.ts, "preamble tap no longer held");
            return None;
        };

        let l = self.geometry.symbol_len as u64;
        let reference = self.taps.get(k.checked_sub(2 * l)?)?.value
            - self.taps.get(k - l)?.value
            + self.taps.get(k)?.value;

        let modulation = self.geometry.modulation;
        let mut codeword = 0u32;
        for i in 0..self.geometry.data_symbols() as u64 {
            let symbol = self.taps.get(k + (i + 1) * l)?.value * reference.conj();
            codeword = (codeword << modulation.bits_per_symbol())
                | modulation.symbol_bits(symbol.re, symbol.im);
        }

        let Some(index) = decode_codeword(codeword, modulation) else {
            metrics::counter!("avsync_audio_crc_failures_total").increment(1);
            debug!(
                channel = self.channel,
                codeword,
                "audio codeword failed CRC"
            );
            return None;
        };

        let frame_start = peak.ts.saturating_sub(self.preamble_span_ns);
        let timestamp = frame_start + self.geometry.marker_offset_ns(self.starts_at_sync);

        self.markers_total.increment(1);
        Some(AudioMarkerEvent {
            timestamp,
            index,
            score: peak.score,
            channel: self.channel,
            index_modulus: self.index_modulus,
        })
    }
}

//! State crossing the video and audio paths.
//!
//! One lock guards the oscillator parameters, the pipeline start time and the
//! index matcher. Critical sections are short and never do I/O.

use std::sync::Arc;

use contracts::{MarkerDescriptor, MarkerSide, SyncFoundEvent, DEFAULT_INDEX_MODULUS};
use parking_lot::Mutex;
use serde::Serialize;

use crate::matcher::SyncIndexMatcher;

/// Tone parameters published by the video path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OscillatorParams {
    pub frequency_hz: u32,
    pub cycles_per_symbol: u32,
    pub quantization_ms: u32,
    pub type_flags: u32,
    pub index_modulus: u32,
    /// Bumped whenever a field changes
    pub generation: u64,
}

impl OscillatorParams {
    fn same_settings(&self, desc: &MarkerDescriptor) -> bool {
        self.frequency_hz == desc.frequency_hz
            && self.cycles_per_symbol == desc.cycles_per_symbol
            && self.quantization_ms == desc.quantization_ms
            && self.type_flags == desc.type_flags
            && self.index_modulus == desc.index_modulus
    }
}

/// Copy of the shared state taken once per callback
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub params: Option<OscillatorParams>,
    pub start_ts: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    params: Option<OscillatorParams>,
    start_ts: Option<u64>,
    matcher: SyncIndexMatcher,
}

/// Handle to the shared state; clones refer to the same state
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    pub fn new(max_records: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                params: None,
                start_ts: None,
                matcher: SyncIndexMatcher::new(max_records),
            })),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            params: inner.params,
            start_ts: inner.start_ts,
        }
    }

    /// Fix the pipeline start at `ts` unless already set; returns the start
    pub fn start_at(&self, ts: u64) -> u64 {
        *self.inner.lock().start_ts.get_or_insert(ts)
    }

    /// Publish a valid descriptor. Returns the new parameters when they
    /// differ from the previous ones.
    pub fn publish(&self, desc: &MarkerDescriptor) -> Option<OscillatorParams> {
        let mut inner = self.inner.lock();
        if inner.params.is_some_and(|p| p.same_settings(desc)) {
            return None;
        }
        let generation = inner.params.map_or(0, |p| p.generation + 1);
        let params = OscillatorParams {
            frequency_hz: desc.frequency_hz,
            cycles_per_symbol: desc.cycles_per_symbol,
            quantization_ms: desc.quantization_ms,
            type_flags: desc.type_flags,
            index_modulus: desc.index_modulus,
            generation,
        };
        inner.params = Some(params);
        Some(params)
    }

    /// Hand a one-sided detection to the matcher
    pub fn match_marker(&self, side: MarkerSide, index: u32, ts: u64) -> Option<SyncFoundEvent> {
        let mut inner = self.inner.lock();
        let modulus = inner
            .params
            .map_or(DEFAULT_INDEX_MODULUS, |p| p.index_modulus);
        inner.matcher.push(side, index, ts, modulus)
    }

    /// Pending records in the matcher
    pub fn pending_records(&self) -> usize {
        self.inner.lock().matcher.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(frequency_hz: u32) -> MarkerDescriptor {
        MarkerDescriptor {
            frequency_hz,
            cycles_per_symbol: 4,
            quantization_ms: 100,
            index: 0,
            index_modulus: 256,
            type_flags: 0,
            valid: true,
        }
    }

    #[test]
    fn test_publish_only_reports_changes() {
        let shared = SharedState::new(16);
        let first = shared.publish(&descriptor(1000)).unwrap();
        assert_eq!(first.generation, 0);

        let mut same_index_changed = descriptor(1000);
        same_index_changed.index = 7;
        assert!(shared.publish(&same_index_changed).is_none());

        let second = shared.publish(&descriptor(2000)).unwrap();
        assert_eq!(second.generation, 1);
        assert_eq!(shared.snapshot().params.unwrap().frequency_hz, 2000);
    }

    #[test]
    fn test_start_is_fixed_once() {
        let shared = SharedState::new(16);
        assert_eq!(shared.start_at(500), 500);
        assert_eq!(shared.start_at(900), 500);
        assert_eq!(shared.snapshot().start_ts, Some(500));
    }

    #[test]
    fn test_clones_share_matcher() {
        let shared = SharedState::new(16);
        let audio_side = shared.clone();
        assert!(shared.match_marker(MarkerSide::Video, 3, 10).is_none());
        assert_eq!(audio_side.pending_records(), 1);
        assert!(audio_side.match_marker(MarkerSide::Audio, 3, 20).is_some());
    }
}

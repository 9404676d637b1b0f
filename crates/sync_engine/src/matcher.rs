//! Sync index matcher.
//!
//! Pairs one-sided video/audio detections that share a marker index. Records
//! live in a bounded, insertion-ordered list; a record is removed as soon as
//! both sides are present.

use std::collections::VecDeque;

use contracts::{MarkerSide, SyncFoundEvent, DEFAULT_INDEX_MODULUS};
use tracing::{instrument, trace};

use crate::circular;

/// Record bound used unless configured otherwise
pub const DEFAULT_MAX_RECORDS: usize = 128;

/// Pending pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    pub index: u32,
    pub video_ts: Option<u64>,
    pub audio_ts: Option<u64>,
}

impl SyncRecord {
    fn new(side: MarkerSide, index: u32, ts: u64) -> Self {
        let mut record = Self {
            index,
            video_ts: None,
            audio_ts: None,
        };
        *record.side_mut(side) = Some(ts);
        record
    }

    pub fn side(&self, side: MarkerSide) -> Option<u64> {
        match side {
            MarkerSide::Video => self.video_ts,
            MarkerSide::Audio => self.audio_ts,
        }
    }

    fn side_mut(&mut self, side: MarkerSide) -> &mut Option<u64> {
        match side {
            MarkerSide::Video => &mut self.video_ts,
            MarkerSide::Audio => &mut self.audio_ts,
        }
    }
}

/// Bounded index matcher
#[derive(Debug)]
pub struct SyncIndexMatcher {
    records: VecDeque<SyncRecord>,
    max_records: usize,
    evicted: u64,
    purged: u64,
}

impl Default for SyncIndexMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl SyncIndexMatcher {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            records: VecDeque::with_capacity(max_records),
            max_records,
            evicted: 0,
            purged: 0,
        }
    }

    /// Feed one detection. Returns the completed pairing, if any.
    #[instrument(level = "trace", name = "sync_matcher_push", skip(self))]
    pub fn push(
        &mut self,
        side: MarkerSide,
        index: u32,
        ts: u64,
        modulus: u32,
    ) -> Option<SyncFoundEvent> {
        let modulus = if modulus < 2 {
            DEFAULT_INDEX_MODULUS
        } else {
            modulus
        };

        self.purge_stale(side, index, modulus);

        if let Some(pos) = self.records.iter().position(|r| r.index == index) {
            let record = self.records[pos];
            if record.side(side).is_none() {
                self.records.remove(pos);
                let mut done = record;
                *done.side_mut(side) = Some(ts);
                return match (done.video_ts, done.audio_ts) {
                    (Some(video_ts), Some(audio_ts)) => Some(SyncFoundEvent {
                        index,
                        video_ts,
                        audio_ts,
                    }),
                    _ => None,
                };
            }
            // fresher detection of the same side
            trace!(index, side = side.as_str(), "superseding record");
            self.records.remove(pos);
        }

        if self.records.len() >= self.max_records {
            if let Some(old) = self.records.pop_front() {
                self.evicted += 1;
                metrics::counter!("avsync_sync_records_evicted_total").increment(1);
                trace!(index = old.index, "evicted oldest sync record");
            }
        }

        self.records.push_back(SyncRecord::new(side, index, ts));
        None
    }

    fn purge_stale(&mut self, side: MarkerSide, index: u32, modulus: u32) {
        let before = self.records.len();
        self.records.retain(|r| {
            r.side(side).is_none() || !circular::is_stale(r.index, index, modulus)
        });
        let purged = before - self.records.len();
        if purged > 0 {
            self.purged += purged as u64;
            metrics::counter!("avsync_sync_records_purged_total").increment(purged as u64);
            trace!(purged, index, side = side.as_str(), "purged stale sync records");
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &SyncRecord> {
        self.records.iter()
    }

    /// Records dropped because the bound was reached
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Records dropped as stale
    pub fn purged(&self) -> u64 {
        self.purged
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_then_audio_pairs() {
        let mut matcher = SyncIndexMatcher::default();
        assert!(matcher.push(MarkerSide::Video, 5, 1000, 256).is_none());
        let found = matcher.push(MarkerSide::Audio, 5, 1200, 256).unwrap();
        assert_eq!(
            found,
            SyncFoundEvent {
                index: 5,
                video_ts: 1000,
                audio_ts: 1200
            }
        );
        assert!(matcher.is_empty());
        assert!(matcher.push(MarkerSide::Audio, 5, 1300, 256).is_none());
    }

    #[test]
    fn test_timestamp_zero_is_a_value() {
        let mut matcher = SyncIndexMatcher::default();
        matcher.push(MarkerSide::Audio, 0, 0, 256);
        let found = matcher.push(MarkerSide::Video, 0, 0, 256).unwrap();
        assert_eq!(found.latency_ns(), 0);
    }

    #[test]
    fn test_bounded_by_max_records() {
        let mut matcher = SyncIndexMatcher::default();
        for i in 0..200u32 {
            matcher.push(MarkerSide::Video, i % 256, i as u64 * 1000, 256);
            assert!(matcher.len() <= DEFAULT_MAX_RECORDS);
        }
        assert_eq!(matcher.len(), DEFAULT_MAX_RECORDS);
    }

    #[test]
    fn test_oldest_evicted_when_full() {
        let mut matcher = SyncIndexMatcher::new(4);
        for i in 0..10u32 {
            matcher.push(MarkerSide::Audio, i, i as u64, 256);
        }
        assert_eq!(matcher.len(), 4);
        assert_eq!(matcher.evicted(), 6);
        assert_eq!(matcher.records().next().map(|r| r.index), Some(6));
    }

    #[test]
    fn test_same_side_duplicate_supersedes() {
        let mut matcher = SyncIndexMatcher::default();
        matcher.push(MarkerSide::Video, 9, 100, 256);
        matcher.push(MarkerSide::Video, 9, 200, 256);
        assert_eq!(matcher.len(), 1);
        let found = matcher.push(MarkerSide::Audio, 9, 250, 256).unwrap();
        assert_eq!(found.video_ts, 200);
    }

    #[test]
    fn test_stale_same_side_records_purged() {
        let mut matcher = SyncIndexMatcher::default();
        matcher.push(MarkerSide::Video, 10, 100, 256);
        matcher.push(MarkerSide::Audio, 11, 110, 256);
        // 10 -> 150 is beyond half the index space
        matcher.push(MarkerSide::Video, 150, 5_000, 256);
        let indices: Vec<u32> = matcher.records().map(|r| r.index).collect();
        assert_eq!(indices, vec![11, 150]);
        assert_eq!(matcher.purged(), 1);
    }

    #[test]
    fn test_wraparound_is_not_stale() {
        let mut matcher = SyncIndexMatcher::default();
        matcher.push(MarkerSide::Video, 250, 100, 256);
        matcher.push(MarkerSide::Video, 3, 200, 256);
        assert_eq!(matcher.len(), 2);
    }
}

//! Decaying-peak detector.
//!
//! Tracks the latest local maximum of a timestamped score stream and confirms
//! it once `wait_ts` has passed without a larger (decayed) score arriving.
//! Older scores lose weight along `1 - (Δ / range)^2` instead of a hard
//! timeout.

/// Timestamped score
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub ts: u64,
    pub score: f64,
}

/// Local-maximum tracker for one signal source
#[derive(Debug, Clone)]
pub struct PeakFinder {
    candidate: Peak,
    last: Peak,
    /// Forgetting horizon (ns), always > 0
    decay_range: u64,
}

impl PeakFinder {
    pub fn new(decay_range: u64) -> Self {
        Self {
            candidate: Peak::default(),
            last: Peak::default(),
            decay_range: decay_range.max(1),
        }
    }

    /// Weight of a score taken at `from` when compared at `to`
    pub fn decay(&self, from: u64, to: u64) -> f64 {
        if to <= from {
            return 1.0;
        }
        let elapsed = to - from;
        if elapsed > self.decay_range {
            return 0.0;
        }
        let f = elapsed as f64 / self.decay_range as f64;
        1.0 - f * f
    }

    /// Feed one sample. Returns `true` when the held candidate is confirmed
    /// as a new peak, available through [`PeakFinder::last`].
    #[inline]
    pub fn append(&mut self, score: f64, ts: u64, wait_ts: u64) -> bool {
        if score > self.candidate.score * self.decay(self.candidate.ts, ts) {
            // a larger score may still follow
            self.candidate = Peak { ts, score };
            return false;
        }

        if self.candidate.ts.saturating_add(wait_ts) > ts {
            return false;
        }

        if self.candidate.ts > self.last.ts
            && self.candidate.score > self.last.score * self.decay(self.last.ts, self.candidate.ts)
        {
            self.last = self.candidate;
            return true;
        }

        false
    }

    pub fn candidate(&self) -> Peak {
        self.candidate
    }

    /// Last confirmed peak
    pub fn last(&self) -> Peak {
        self.last
    }

    pub fn decay_range(&self) -> u64 {
        self.decay_range
    }

    pub fn set_decay_range(&mut self, decay_range: u64) {
        self.decay_range = decay_range.max(1);
    }

    /// Forget candidate and confirmed peak
    pub fn reset(&mut self) {
        self.candidate = Peak::default();
        self.last = Peak::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: u64 = 2_000_000_000;

    #[test]
    fn test_decay_endpoints() {
        let finder = PeakFinder::new(RANGE);
        assert_eq!(finder.decay(1_000, 1_000), 1.0);
        assert_eq!(finder.decay(1_000, 500), 1.0);
        assert_eq!(finder.decay(1_000, 1_000 + RANGE + 1), 0.0);
        assert!(finder.decay(1_000, 1_000 + RANGE).abs() < 1e-12);
    }

    #[test]
    fn test_decay_is_quadratic_and_decreasing() {
        let finder = PeakFinder::new(RANGE);
        let half = finder.decay(0, RANGE / 2);
        assert!((half - 0.75).abs() < 1e-12);

        let mut prev = 1.0;
        for step in 1..100u64 {
            let value = finder.decay(0, step * RANGE / 100);
            assert!(value < prev, "not decreasing at step {step}");
            prev = value;
        }
    }

    #[test]
    fn test_single_peak_confirmed_once() {
        let mut finder = PeakFinder::new(RANGE);
        let wait = 30;
        // rise to 1.0 at t=50, then fall
        let scores = [0.1, 0.3, 0.6, 0.9, 1.0, 0.8, 0.5, 0.2, 0.1, 0.05, 0.0, 0.0, 0.0];
        let mut confirmed = Vec::new();
        for (i, score) in scores.iter().enumerate() {
            let ts = 10 + i as u64 * 10;
            if finder.append(*score, ts, wait) {
                confirmed.push(finder.last().ts);
            }
        }
        assert_eq!(confirmed, vec![50]);
        assert_eq!(finder.last().score, 1.0);
    }

    #[test]
    fn test_no_confirmation_before_wait() {
        let mut finder = PeakFinder::new(RANGE);
        assert!(!finder.append(1.0, 100, 1_000));
        assert!(!finder.append(0.5, 200, 1_000));
        assert!(!finder.append(0.5, 1_099, 1_000));
        assert!(finder.append(0.5, 1_100, 1_000));
        assert_eq!(finder.last().ts, 100);
    }

    #[test]
    fn test_weaker_follow_up_rejected_within_range() {
        let mut finder = PeakFinder::new(1_000);
        finder.append(1.0, 100, 10);
        assert!(finder.append(0.0, 200, 10));

        // a weaker bump shortly after the confirmed peak is not reported
        finder.append(0.5, 300, 10);
        assert!(!finder.append(0.0, 400, 10));

        // far enough away the old peak no longer counts
        finder.append(0.5, 2_000, 10);
        assert!(finder.append(0.0, 2_100, 10));
        assert_eq!(finder.last().ts, 2_000);
    }
}

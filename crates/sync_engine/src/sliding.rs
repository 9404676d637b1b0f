//! Fixed-capacity sliding accumulators used by the audio correlator.
//!
//! - `SlidingSum`: box filter over the last `len` values, O(1) per push
//! - `TapHistory`: bounded history of window sums with random access

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Add, Sub};

use ringbuf::{traits::*, HeapRb};

/// Values the box filter can accumulate
pub trait Accumulate: Copy + Default + Add<Output = Self> + Sub<Output = Self> {}

impl<T> Accumulate for T where T: Copy + Default + Add<Output = T> + Sub<Output = T> {}

/// Pushes between full re-summations, bounds floating point drift
const RESUM_INTERVAL: u64 = 1 << 16;

/// Running sum of the most recent `len` values
pub struct SlidingSum<T: Accumulate> {
    window: HeapRb<T>,
    sum: T,
    pushes: u64,
}

impl<T: Accumulate> fmt::Debug for SlidingSum<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingSum")
            .field("len", &self.window.occupied_len())
            .field("capacity", &self.window.capacity())
            .finish()
    }
}

impl<T: Accumulate> SlidingSum<T> {
    pub fn new(len: usize) -> Self {
        Self {
            window: HeapRb::new(len.max(1)),
            sum: T::default(),
            pushes: 0,
        }
    }

    /// Add a value, dropping the oldest one once the window is full.
    /// Returns the window sum when the window is full.
    #[inline]
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.window.is_full() {
            if let Some(old) = self.window.try_pop() {
                self.sum = self.sum - old;
            }
        }
        let _ = self.window.try_push(value);
        self.sum = self.sum + value;

        self.pushes += 1;
        if self.pushes % RESUM_INTERVAL == 0 {
            self.sum = self.window.iter().fold(T::default(), |acc, v| acc + *v);
        }

        self.window.is_full().then_some(self.sum)
    }

    pub fn sum(&self) -> T {
        self.sum
    }

    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }

    pub fn len(&self) -> usize {
        self.window.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = T::default();
        self.pushes = 0;
    }
}

/// One window sum and the timestamp of its newest sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap<T> {
    pub value: T,
    pub ts: u64,
}

/// Bounded tap history, oldest first
///
/// Taps carry a running sequence number so a position remembered earlier
/// can be found again after older taps were dropped.
#[derive(Debug)]
pub struct TapHistory<T> {
    taps: VecDeque<Tap<T>>,
    capacity: usize,
    /// Sequence number of the next pushed tap
    next_seq: u64,
}

impl<T: Copy> TapHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            taps: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Append a tap and return its sequence number
    #[inline]
    pub fn push(&mut self, value: T, ts: u64) -> u64 {
        if self.taps.len() == self.capacity {
            self.taps.pop_front();
        }
        self.taps.push_back(Tap { value, ts });
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// Sequence number of the oldest held tap
    pub fn front_seq(&self) -> u64 {
        self.next_seq - self.taps.len() as u64
    }

    /// Sequence number of the newest held tap
    pub fn newest_seq(&self) -> Option<u64> {
        self.next_seq.checked_sub(1).filter(|_| !self.taps.is_empty())
    }

    /// Tap by sequence number, if still held
    #[inline]
    pub fn get(&self, seq: u64) -> Option<&Tap<T>> {
        let offset = seq.checked_sub(self.front_seq())?;
        self.taps.get(usize::try_from(offset).ok()?)
    }

    pub fn clear(&mut self) {
        self.taps.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_sliding_sum_reports_once_full() {
        let mut sum = SlidingSum::new(3);
        assert_eq!(sum.push(1.0), None);
        assert_eq!(sum.push(2.0), None);
        assert_eq!(sum.push(3.0), Some(6.0));
        assert_eq!(sum.push(4.0), Some(9.0));
        assert_eq!(sum.len(), 3);
    }

    #[test]
    fn test_sliding_sum_complex_and_clear() {
        let mut sum = SlidingSum::new(2);
        sum.push(Complex64::new(1.0, -1.0));
        let full = sum.push(Complex64::new(0.5, 2.0)).unwrap();
        assert_eq!(full, Complex64::new(1.5, 1.0));

        sum.clear();
        assert!(sum.is_empty());
        assert_eq!(sum.sum(), Complex64::default());
    }

    #[test]
    fn test_sliding_sum_stays_exact_across_resum() {
        let mut sum = SlidingSum::new(4);
        let mut last = None;
        for i in 0..(RESUM_INTERVAL + 10) {
            last = sum.push((i % 7) as f64);
        }
        let expected: f64 = (RESUM_INTERVAL + 6..RESUM_INTERVAL + 10)
            .map(|i| (i % 7) as f64)
            .sum();
        assert_eq!(last, Some(expected));
    }

    #[test]
    fn test_tap_history_sequence_lookup() {
        let mut history = TapHistory::new(3);
        for i in 0..5u64 {
            assert_eq!(history.push(i as f64, i * 10), i);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.front_seq(), 2);
        assert_eq!(history.newest_seq(), Some(4));
        assert!(history.get(1).is_none());
        assert_eq!(history.get(3).map(|t| t.ts), Some(30));
        assert!(history.get(5).is_none());
    }
}

//! Bounded per-metric sample history

use heapless::Deque;

use super::Reading;

/// Default number of readings kept per metric.
pub const HISTORY_CAPACITY: usize = 120;

/// Ring buffer of readings, oldest first.
///
/// When full, pushing a new reading evicts the oldest one.
#[derive(Debug, Clone)]
pub struct MetricHistory<const N: usize = HISTORY_CAPACITY> {
    readings: Deque<Reading, N>,
}

impl<const N: usize> Default for MetricHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MetricHistory<N> {
    pub const fn new() -> Self {
        Self {
            readings: Deque::new(),
        }
    }

    pub fn push(&mut self, reading: Reading) {
        if self.readings.is_full() {
            self.readings.pop_front();
        }
        let _ = self.readings.push_back(reading);
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// The reading before the latest one, for trend arrows.
    pub fn previous(&self) -> Option<&Reading> {
        let len = self.readings.len();
        if len < 2 {
            return None;
        }
        self.readings.iter().nth(len - 2)
    }

    /// All readings, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter()
    }

    /// The newest `count` readings, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &Reading> + '_ {
        self.readings
            .iter()
            .skip(self.readings.len().saturating_sub(count))
    }

    /// Minimum and maximum value over the whole history.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.readings.iter().fold(None, |acc, r| match acc {
            None => Some((r.value, r.value)),
            Some((min, max)) => Some((min.min(r.value), max.max(r.value))),
        })
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Metric, Unit};
    use embassy_time::Instant;

    fn reading(value: f32, secs: u64) -> Reading {
        Reading {
            metric: Metric::Humidity,
            value,
            unit: Unit::Percent,
            timestamp: Instant::from_secs(secs),
            synthetic: false,
        }
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut history: MetricHistory<4> = MetricHistory::new();
        for i in 0..10 {
            history.push(reading(i as f32, i));
            assert!(history.len() <= 4);
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.capacity(), 4);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut history: MetricHistory<3> = MetricHistory::new();
        for i in 1..=5 {
            history.push(reading(i as f32, i));
        }
        let values: Vec<f32> = history.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
        assert_eq!(history.latest().map(|r| r.value), Some(5.0));
        assert_eq!(history.previous().map(|r| r.value), Some(4.0));
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history: MetricHistory<10> = MetricHistory::new();
        for i in 0..6 {
            history.push(reading(i as f32, i));
        }
        let tail: Vec<f32> = history.recent(3).map(|r| r.value).collect();
        assert_eq!(tail, vec![3.0, 4.0, 5.0]);
        let all: Vec<f32> = history.recent(20).map(|r| r.value).collect();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_range() {
        let mut history: MetricHistory<8> = MetricHistory::new();
        assert_eq!(history.range(), None);
        for v in [4.0, -1.0, 9.5, 3.0] {
            history.push(reading(v, 0));
        }
        assert_eq!(history.range(), Some((-1.0, 9.5)));
    }
}

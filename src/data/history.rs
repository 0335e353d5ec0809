//! Rolling window of density samples for the history chart.

use std::collections::VecDeque;

use super::sample::DensitySample;

/// Default number of samples kept in the rolling window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered buffer of density samples.
///
/// Once the buffer is full, every append evicts the oldest sample. Samples
/// are never reordered after insertion.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<DensitySample>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample at the tail, evicting from the head when full.
    pub fn append(&mut self, sample: DensitySample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Append many samples in order. Only the last `capacity` survive.
    pub fn extend<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = DensitySample>,
    {
        for sample in samples {
            self.append(sample);
        }
    }

    /// Point-in-time copy of the buffer contents, oldest first.
    pub fn snapshot(&self) -> Vec<DensitySample> {
        self.samples.iter().copied().collect()
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<&DensitySample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::DensityReading;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(n: u32) -> DensitySample {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        DensitySample::at(
            base + Duration::seconds(n as i64),
            DensityReading {
                person_count: n,
                density_value: 0.1,
                density_per_sqm: 0.2,
            },
        )
    }

    #[test]
    fn new_buffer_is_empty() {
        let buffer = HistoryBuffer::new(10);
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 10);
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = HistoryBuffer::new(0);
        buffer.append(sample(1));
        buffer.append(sample(2));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest().unwrap().person_count, 2);
    }

    #[test]
    fn keeps_last_capacity_samples_in_arrival_order() {
        let mut buffer = HistoryBuffer::new(100);
        for n in 0..101 {
            buffer.append(sample(n));
            assert!(buffer.len() <= 100);
        }

        let counts: Vec<u32> = buffer.snapshot().iter().map(|s| s.person_count).collect();
        assert_eq!(counts, (1..101).collect::<Vec<_>>());
    }

    #[test]
    fn evicts_oldest_on_every_insert_once_full() {
        let mut buffer = HistoryBuffer::new(3);
        buffer.extend((0..3).map(sample));
        assert_eq!(buffer.snapshot()[0].person_count, 0);

        buffer.append(sample(3));
        assert_eq!(buffer.snapshot()[0].person_count, 1);
        buffer.append(sample(4));
        assert_eq!(buffer.snapshot()[0].person_count, 2);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let mut buffer = HistoryBuffer::new(5);
        buffer.append(sample(1));
        let snapshot = buffer.snapshot();
        buffer.append(sample(2));
        buffer.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(buffer.is_empty());
    }
}

//! Bounded trajectory window with exact running totals.

use std::collections::VecDeque;

use crate::error::StaleSample;
use crate::haversine;
use crate::model::LocationSample;

/// Default number of samples retained per session.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Read-only view of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySnapshot {
    pub samples: Vec<LocationSample>,
    pub total_distance_meters: f64,
    pub total_duration_millis: i64,
}

/// Sliding window over the most recent samples of one session.
///
/// Totals are accumulated on every accepted sample, so they cover the whole
/// session even after the oldest samples are evicted from the window.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    samples: VecDeque<LocationSample>,
    capacity: usize,
    last: Option<LocationSample>,
    total_distance_meters: f64,
    total_duration_millis: i64,
    accepted: u64,
}

impl Default for TrajectoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl TrajectoryBuffer {
    /// A zero capacity is treated as one so the last sample is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_WINDOW_SIZE)),
            capacity,
            last: None,
            total_distance_meters: 0.0,
            total_duration_millis: 0,
            accepted: 0,
        }
    }

    /// Append a sample, returning the distance it added.
    ///
    /// Samples with a timestamp earlier than the last accepted one are
    /// rejected and leave the buffer untouched. Equal timestamps are accepted.
    pub fn append(&mut self, sample: LocationSample) -> Result<f64, StaleSample> {
        let mut step = 0.0;
        if let Some(previous) = &self.last {
            if sample.timestamp_ms < previous.timestamp_ms {
                return Err(StaleSample {
                    timestamp_ms: sample.timestamp_ms,
                    last_accepted_ms: previous.timestamp_ms,
                });
            }
            step = haversine::distance_meters(previous.coordinate(), sample.coordinate());
            self.total_distance_meters += step;
            self.total_duration_millis += sample.timestamp_ms - previous.timestamp_ms;
        }

        self.last = Some(sample.clone());
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.accepted += 1;

        Ok(step)
    }

    pub fn snapshot(&self) -> TrajectorySnapshot {
        TrajectorySnapshot {
            samples: self.samples.iter().cloned().collect(),
            total_distance_meters: self.total_distance_meters,
            total_duration_millis: self.total_duration_millis,
        }
    }

    pub fn last(&self) -> Option<&LocationSample> {
        self.last.as_ref()
    }

    /// Attach an address to the retained sample with this timestamp.
    ///
    /// Returns false if that sample has already been evicted.
    pub fn set_address(&mut self, timestamp_ms: i64, address: String) -> bool {
        if let Some(last) = self.last.as_mut() {
            if last.timestamp_ms == timestamp_ms && last.address.is_none() {
                last.address = Some(address.clone());
            }
        }
        match self
            .samples
            .iter_mut()
            .rev()
            .find(|sample| sample.timestamp_ms == timestamp_ms)
        {
            Some(sample) => {
                sample.address = Some(address);
                true
            }
            None => false,
        }
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

    /// Samples accepted over the whole session, evicted ones included.
    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.total_distance_meters
    }

    pub fn total_duration_millis(&self) -> i64 {
        self.total_duration_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64, lng: f64, ts: i64) -> LocationSample {
        LocationSample::new(lat, lng, ts)
    }

    #[test]
    fn test_first_sample_adds_nothing() {
        let mut buffer = TrajectoryBuffer::default();
        assert_eq!(buffer.append(sample(36.1, -115.1, 1_000)), Ok(0.0));
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.samples.len(), 1);
        assert_eq!(snapshot.total_distance_meters, 0.0);
        assert_eq!(snapshot.total_duration_millis, 0);
    }

    #[test]
    fn test_totals_accumulate() {
        let mut buffer = TrajectoryBuffer::default();
        buffer.append(sample(0.0, 0.0, 0)).unwrap();
        buffer.append(sample(0.0, 0.01, 30_000)).unwrap();
        buffer.append(sample(0.0, 0.02, 60_000)).unwrap();

        assert!((buffer.total_distance_meters() - 2_223.9).abs() < 1.0);
        assert_eq!(buffer.total_duration_millis(), 60_000);
    }

    #[test]
    fn test_stale_sample_rejected_without_side_effects() {
        let mut buffer = TrajectoryBuffer::default();
        buffer.append(sample(0.0, 0.0, 10_000)).unwrap();
        buffer.append(sample(0.0, 0.01, 20_000)).unwrap();
        let before = buffer.snapshot();

        let err = buffer.append(sample(5.0, 5.0, 15_000)).unwrap_err();
        assert_eq!(err.timestamp_ms, 15_000);
        assert_eq!(err.last_accepted_ms, 20_000);
        assert_eq!(buffer.snapshot(), before);
    }

    #[test]
    fn test_equal_timestamp_accepted() {
        let mut buffer = TrajectoryBuffer::default();
        buffer.append(sample(0.0, 0.0, 5_000)).unwrap();
        assert!(buffer.append(sample(0.0, 0.001, 5_000)).is_ok());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_duration_millis(), 0);
    }

    #[test]
    fn test_window_eviction_keeps_exact_totals() {
        let mut buffer = TrajectoryBuffer::new(1000);
        let mut expected = 0.0;
        let mut previous: Option<LocationSample> = None;

        for i in 0..1500_i64 {
            let next = sample(0.0, i as f64 * 0.0001, i * 1_000);
            if let Some(prev) = &previous {
                expected += haversine::distance_meters(prev.coordinate(), next.coordinate());
            }
            previous = Some(next.clone());
            buffer.append(next).unwrap();
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.samples.len(), 1000);
        assert_eq!(snapshot.samples[0].timestamp_ms, 500_000);
        assert_eq!(snapshot.samples[999].timestamp_ms, 1_499_000);
        assert!((snapshot.total_distance_meters - expected).abs() < 1e-6);
        assert_eq!(snapshot.total_duration_millis, 1_499_000);
        assert_eq!(buffer.accepted_count(), 1500);
    }

    #[test]
    fn test_zero_capacity_keeps_last_sample() {
        let mut buffer = TrajectoryBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);

        buffer.append(sample(0.0, 0.0, 1)).unwrap();
        buffer.append(sample(0.0, 0.01, 2)).unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.last().map(|s| s.timestamp_ms), Some(2));
        assert!(buffer.total_distance_meters() > 1_000.0);
    }

    #[test]
    fn test_stale_check_survives_eviction() {
        let mut buffer = TrajectoryBuffer::new(1);
        buffer.append(sample(0.0, 0.0, 100)).unwrap();
        buffer.append(sample(0.0, 0.0, 200)).unwrap();
        assert!(buffer.append(sample(0.0, 0.0, 150)).is_err());
    }

    #[test]
    fn test_set_address_on_retained_sample() {
        let mut buffer = TrajectoryBuffer::new(2);
        buffer.append(sample(0.0, 0.0, 1)).unwrap();
        buffer.append(sample(0.0, 0.0, 2)).unwrap();
        assert!(buffer.set_address(2, "Main St".to_string()));
        assert_eq!(buffer.last().and_then(|s| s.address.as_deref()), Some("Main St"));

        buffer.append(sample(0.0, 0.0, 3)).unwrap();
        assert!(!buffer.set_address(1, "gone".to_string()));
    }
}

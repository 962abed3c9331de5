//! Thread-safe append-only store of inertial samples.

use parking_lot::RwLock;

use super::error::ImuError;
use super::sample::{ImuSample, Timestamp};

/// Append-only, time-ordered sample store shared between the acquisition
/// role (writer) and the estimation role (reader).
///
/// Samples are never evicted; the caller bounds memory by creating a new
/// buffer per run.
#[derive(Debug, Default)]
pub struct InertialBuffer {
    samples: RwLock<Vec<ImuSample>>,
}

impl InertialBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Timestamps must be strictly increasing.
    pub fn push(&self, sample: ImuSample) -> Result<(), ImuError> {
        let mut samples = self.samples.write();
        if let Some(last) = samples.last() {
            if sample.timestamp_ns <= last.timestamp_ns {
                return Err(ImuError::NonMonotonicTimestamp {
                    timestamp: sample.timestamp_ns,
                    last: last.timestamp_ns,
                });
            }
        }
        samples.push(sample);
        Ok(())
    }

    /// Samples with `start <= t <= end`, in time order.
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Vec<ImuSample> {
        if end < start {
            return Vec::new();
        }
        let samples = self.samples.read();
        let lo = samples.partition_point(|s| s.timestamp_ns < start);
        let hi = samples.partition_point(|s| s.timestamp_ns <= end);
        samples[lo..hi].to_vec()
    }

    /// Samples covering `[start, end]` under a zero-order hold: the last one
    /// at or before `start`, then every one up to `end`.
    pub fn covering(&self, start: Timestamp, end: Timestamp) -> Vec<ImuSample> {
        let samples = self.samples.read();
        let lo = samples
            .partition_point(|s| s.timestamp_ns <= start)
            .saturating_sub(1);
        let hi = samples.partition_point(|s| s.timestamp_ns <= end).max(lo);
        samples[lo..hi].to_vec()
    }

    /// Like [`range`](Self::range), but reports whether the interval can be
    /// served completely by what is buffered.
    pub fn query(&self, start: Timestamp, end: Timestamp) -> Result<Vec<ImuSample>, ImuError> {
        if end < start {
            return Err(ImuError::InvalidTimeRange { start, end });
        }
        let (oldest, newest) = {
            let samples = self.samples.read();
            (
                samples.first().map(|s| s.timestamp_ns),
                samples.last().map(|s| s.timestamp_ns),
            )
        };
        match (oldest, newest) {
            (_, None) => Err(ImuError::DataNotYetAvailable {
                requested: end,
                newest: None,
            }),
            (_, Some(newest)) if newest < end => Err(ImuError::DataNotYetAvailable {
                requested: end,
                newest: Some(newest),
            }),
            (Some(oldest), _) if start < oldest => Err(ImuError::DataNeverAvailable {
                requested: start,
                oldest,
            }),
            _ => Ok(self.range(start, end)),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.samples.read().first().map(|s| s.timestamp_ns)
    }

    pub fn newest_timestamp(&self) -> Option<Timestamp> {
        self.samples.read().last().map(|s| s.timestamp_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn sample(t: Timestamp) -> ImuSample {
        ImuSample::new(t, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros())
    }

    fn filled(timestamps: &[Timestamp]) -> InertialBuffer {
        let buffer = InertialBuffer::new();
        for &t in timestamps {
            buffer.push(sample(t)).unwrap();
        }
        buffer
    }

    #[test]
    fn test_rejects_non_monotonic() {
        let buffer = filled(&[10, 20]);
        assert_eq!(
            buffer.push(sample(20)),
            Err(ImuError::NonMonotonicTimestamp {
                timestamp: 20,
                last: 20
            })
        );
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_range_is_inclusive() {
        let buffer = filled(&[10, 20, 30, 40, 50]);
        let ts: Vec<_> = buffer.range(20, 40).iter().map(|s| s.timestamp_ns).collect();
        assert_eq!(ts, vec![20, 30, 40]);

        assert!(buffer.range(41, 49).is_empty());
        assert!(buffer.range(40, 20).is_empty());
    }

    #[test]
    fn test_covering_includes_held_sample() {
        let buffer = filled(&[10, 20, 30, 40, 50]);
        let ts = |v: Vec<ImuSample>| v.iter().map(|s| s.timestamp_ns).collect::<Vec<_>>();

        assert_eq!(ts(buffer.covering(25, 40)), vec![20, 30, 40]);
        assert_eq!(ts(buffer.covering(20, 35)), vec![20, 30]);
        assert_eq!(ts(buffer.covering(45, Timestamp::MAX)), vec![40, 50]);
        assert_eq!(ts(buffer.covering(5, 15)), vec![10]);
        assert!(InertialBuffer::new().covering(0, 10).is_empty());
    }

    #[test]
    fn test_query_reports_availability() {
        let buffer = filled(&[10, 20, 30]);

        assert_eq!(buffer.query(10, 30).unwrap().len(), 3);
        assert_eq!(
            buffer.query(10, 35),
            Err(ImuError::DataNotYetAvailable {
                requested: 35,
                newest: Some(30)
            })
        );
        assert_eq!(
            buffer.query(5, 30),
            Err(ImuError::DataNeverAvailable {
                requested: 5,
                oldest: 10
            })
        );
        assert!(matches!(
            InertialBuffer::new().query(0, 1),
            Err(ImuError::DataNotYetAvailable { newest: None, .. })
        ));
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let buffer = Arc::new(InertialBuffer::new());
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for t in 1..=1000 {
                    buffer.push(sample(t)).unwrap();
                }
            })
        };
        for _ in 0..100 {
            let snapshot = buffer.range(0, u64::MAX);
            assert!(snapshot.windows(2).all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
        }
        writer.join().unwrap();
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.newest_timestamp(), Some(1000));
    }
}

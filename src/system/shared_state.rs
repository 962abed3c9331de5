//! State shared between the acquisition and estimation roles.
//!
//! Only the inertial buffer and the bias/accumulator pair cross threads;
//! each guards itself with a `parking_lot` lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::imu::{
    ImuBias, ImuError, ImuParams, ImuSample, InertialBuffer, PreintegrationManager, Timestamp,
};

pub struct SharedState {
    /// Raw samples. Acquisition appends, estimation reads ranges.
    pub imu_buffer: InertialBuffer,

    /// Bias estimate and in-progress accumulator.
    pub preintegration: PreintegrationManager,

    /// Request the acquisition role to stop producing.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(params: ImuParams, initial_bias: ImuBias) -> Arc<Self> {
        Arc::new(Self {
            imu_buffer: InertialBuffer::new(),
            preintegration: PreintegrationManager::new(params, initial_bias),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Record a sample and fold it into the running accumulator.
    pub fn push_imu(&self, sample: ImuSample) -> Result<(), ImuError> {
        self.imu_buffer.push(sample)?;
        self.preintegration.extend(std::slice::from_ref(&sample));
        Ok(())
    }

    /// Restart the accumulator on the current bias at keyframe time `t`,
    /// keeping samples already acquired past `t`.
    pub fn rebase_at(&self, t: Timestamp) {
        self.preintegration
            .reset_and_rebase_at(t, || self.imu_buffer.covering(t, Timestamp::MAX));
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            imu_buffer: InertialBuffer::new(),
            preintegration: PreintegrationManager::new(ImuParams::default(), ImuBias::zero()),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_push_feeds_buffer_and_accumulator() {
        let shared = SharedState::new(ImuParams::default(), ImuBias::zero());
        for t in 1..=5u64 {
            let sample = ImuSample::new(t * 1_000_000, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
            shared.push_imu(sample).unwrap();
        }
        assert_eq!(shared.imu_buffer.len(), 5);
        let acc = shared.preintegration.current_accumulator();
        assert_eq!((acc.start_ns, acc.end_ns), (1_000_000, 5_000_000));

        let stale = ImuSample::new(2_000_000, Vector3::zeros(), Vector3::zeros());
        assert!(shared.push_imu(stale).is_err());
        assert_eq!(shared.preintegration.current_accumulator(), acc);
    }

    #[test]
    fn test_rebase_at_keeps_samples_acquired_after_keyframe() {
        let shared = SharedState::new(ImuParams::default(), ImuBias::zero());
        for t in 0..=20u64 {
            let sample = ImuSample::new(t * 5_000_000, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
            shared.push_imu(sample).unwrap();
        }
        shared.rebase_at(50_000_000);

        let acc = shared.preintegration.current_accumulator();
        assert_eq!((acc.start_ns, acc.end_ns), (50_000_000, 100_000_000));
        assert!((acc.dt - 0.05).abs() < 1e-12);

        let next = ImuSample::new(105_000_000, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros());
        shared.push_imu(next).unwrap();
        assert_eq!(shared.preintegration.current_accumulator().end_ns, 105_000_000);
    }

    #[test]
    fn test_shutdown_flag() {
        let shared = SharedState::new(ImuParams::default(), ImuBias::zero());
        assert!(!shared.is_shutdown_requested());
        shared.request_shutdown();
        assert!(shared.is_shutdown_requested());
    }
}

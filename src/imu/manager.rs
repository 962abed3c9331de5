//! Owner of the bias estimate and the in-progress preintegration accumulator.
//!
//! Both live behind one mutex so a reader never observes an accumulator
//! paired with a bias it was not meant for.
//!
//! # Roles
//!
//! - Acquisition extends the accumulator as samples arrive
//!   ([`PreintegrationManager::extend`]).
//! - Estimation reads a [`PreintegrationSnapshot`] at the start of a step,
//!   then publishes the new bias and restarts the accumulator at the
//!   keyframe time ([`PreintegrationManager::reset_and_rebase_at`]).
//!
//! Each bias write and each rebase bumps an epoch; a snapshot is `rebased`
//! when the accumulator was started on the bias stored next to it.

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::Mutex;
use tracing::debug;

use super::error::ImuError;
use super::params::ImuParams;
use super::preintegration::{integrate_gyro_range, integrate_range, PreintegratedSummary};
use super::sample::{ImuBias, ImuSample, Timestamp};

/// Consistent read of the bias/accumulator pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PreintegrationSnapshot {
    pub bias: ImuBias,
    pub accumulator: PreintegratedSummary,
    /// True when the accumulator was started with `bias`.
    pub rebased: bool,
}

#[derive(Debug)]
struct Inner {
    bias: ImuBias,
    bias_epoch: u64,
    accumulator: PreintegratedSummary,
    accumulator_epoch: u64,
    gravity: Vector3<f64>,
}

#[derive(Debug)]
pub struct PreintegrationManager {
    params: ImuParams,
    inner: Mutex<Inner>,
}

impl PreintegrationManager {
    pub fn new(params: ImuParams, initial_bias: ImuBias) -> Self {
        Self {
            inner: Mutex::new(Inner {
                bias: initial_bias,
                bias_epoch: 0,
                accumulator: PreintegratedSummary::identity(initial_bias, 0),
                accumulator_epoch: 0,
                gravity: params.gravity,
            }),
            params,
        }
    }

    pub fn params(&self) -> &ImuParams {
        &self.params
    }

    /// Summarize `samples` over `[start, end]` with the current bias.
    ///
    /// Does not touch the accumulator.
    pub fn preintegrate(
        &self,
        start: Timestamp,
        end: Timestamp,
        samples: &[ImuSample],
    ) -> Result<PreintegratedSummary, ImuError> {
        let bias = self.current_bias();
        integrate_range(start, end, samples, bias, &self.params)
    }

    /// Rotation-only summary over `[start, end]` with the current gyro bias.
    pub fn preintegrate_gyro(
        &self,
        start: Timestamp,
        end: Timestamp,
        samples: &[ImuSample],
    ) -> Result<UnitQuaternion<f64>, ImuError> {
        let bias = self.current_bias();
        integrate_gyro_range(start, end, samples, &bias.gyro)
    }

    /// Replace the bias. The accumulator keeps its own `bias_hat` until
    /// the next [`reset_and_rebase`](Self::reset_and_rebase).
    pub fn update_bias(&self, bias: ImuBias) {
        let mut inner = self.inner.lock();
        inner.bias = bias;
        inner.bias_epoch += 1;
        debug!(
            "Bias updated (epoch {}): ba={:?} bg={:?}",
            inner.bias_epoch, bias.accel, bias.gyro
        );
    }

    /// Discard the accumulator and start a fresh one on the current bias.
    pub fn reset_and_rebase(&self) {
        let mut inner = self.inner.lock();
        inner.accumulator = inner.accumulator.rebased(inner.bias);
        inner.accumulator_epoch = inner.bias_epoch;
    }

    /// Restart the accumulator on the current bias at keyframe time `t`.
    ///
    /// `replay` runs under the lock and returns the buffered samples from
    /// the last one at or before `t` onward, so readings acquired while the
    /// keyframe was being optimized are kept. A sample pushed concurrently
    /// is either among them or folded in by its own later `extend`.
    pub fn reset_and_rebase_at<F>(&self, t: Timestamp, replay: F)
    where
        F: FnOnce() -> Vec<ImuSample>,
    {
        let mut inner = self.inner.lock();
        let samples = replay();
        inner.accumulator = PreintegratedSummary::anchored(inner.bias, t, &samples, &self.params);
        inner.accumulator_epoch = inner.bias_epoch;
        debug!(
            "Accumulator rebased at {} ns, {} samples replayed",
            t,
            samples.len()
        );
    }

    /// Fold newly acquired samples into the accumulator.
    pub fn extend(&self, samples: &[ImuSample]) -> usize {
        self.inner.lock().accumulator.extend(samples, &self.params)
    }

    pub fn current_bias(&self) -> ImuBias {
        self.inner.lock().bias
    }

    pub fn current_accumulator(&self) -> PreintegratedSummary {
        self.inner.lock().accumulator.clone()
    }

    pub fn snapshot(&self) -> PreintegrationSnapshot {
        let inner = self.inner.lock();
        PreintegrationSnapshot {
            bias: inner.bias,
            accumulator: inner.accumulator.clone(),
            rebased: inner.bias_epoch == inner.accumulator_epoch,
        }
    }

    pub fn gravity(&self) -> Vector3<f64> {
        self.inner.lock().gravity
    }

    /// Re-seed the navigation-frame gravity, e.g. after alignment.
    pub fn set_gravity(&self, gravity: Vector3<f64>) {
        self.inner.lock().gravity = gravity;
        debug!("Gravity reset to {:?}", gravity);
    }
}

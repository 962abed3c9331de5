//! On-manifold IMU preintegration.
//!
//! Deltas are accumulated in the body frame of the first sample and exclude
//! gravity; gravity enters only in [`PreintegratedSummary::predict`]. The
//! covariance and bias Jacobians follow the usual first-order propagation
//! over the error state `[δθ, δv, δp]`.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::error::ImuError;
use super::params::ImuParams;
use super::sample::{ns_to_sec, ImuBias, ImuSample, Timestamp};
use super::state::NavState;
use super::types::{Matrix6, Matrix9, Matrix9x6};
use crate::geometry::so3;
use crate::geometry::SE3;

/// Relative motion between two instants, valid with respect to `bias_hat`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreintegratedSummary {
    pub delta_rot: UnitQuaternion<f64>,
    pub delta_vel: Vector3<f64>,
    pub delta_pos: Vector3<f64>,
    /// Integrated time in seconds.
    pub dt: f64,
    pub start_ns: Timestamp,
    pub end_ns: Timestamp,
    /// Covariance of `[δθ, δv, δp]`.
    pub covariance: Matrix9,
    /// Bias the deltas were integrated with.
    pub bias_hat: ImuBias,

    pub d_rot_d_bg: Matrix3<f64>,
    pub d_vel_d_ba: Matrix3<f64>,
    pub d_vel_d_bg: Matrix3<f64>,
    pub d_pos_d_ba: Matrix3<f64>,
    pub d_pos_d_bg: Matrix3<f64>,

    /// Reading held until the next extension.
    last_sample: Option<ImuSample>,
}

impl PreintegratedSummary {
    /// Empty summary anchored at `t` with the given bias.
    pub fn identity(bias_hat: ImuBias, t: Timestamp) -> Self {
        Self {
            delta_rot: UnitQuaternion::identity(),
            delta_vel: Vector3::zeros(),
            delta_pos: Vector3::zeros(),
            dt: 0.0,
            start_ns: t,
            end_ns: t,
            covariance: Matrix9::zeros(),
            bias_hat,
            d_rot_d_bg: Matrix3::zeros(),
            d_vel_d_ba: Matrix3::zeros(),
            d_vel_d_bg: Matrix3::zeros(),
            d_pos_d_ba: Matrix3::zeros(),
            d_pos_d_bg: Matrix3::zeros(),
            last_sample: None,
        }
    }

    /// Fresh summary with a new bias, anchored where this one ends. The
    /// held reading carries over so no inertial time is lost.
    pub fn rebased(&self, bias_hat: ImuBias) -> Self {
        Self {
            last_sample: self.last_sample,
            ..Self::identity(bias_hat, self.end_ns)
        }
    }

    /// Fresh summary anchored at `t`, replaying samples buffered around it.
    ///
    /// The last sample at or before `t` is held from `t` onward; later ones
    /// are folded in as by [`extend`](Self::extend).
    pub fn anchored(
        bias_hat: ImuBias,
        t: Timestamp,
        samples: &[ImuSample],
        params: &ImuParams,
    ) -> Self {
        let mut summary = Self::identity(bias_hat, t);
        let split = samples.partition_point(|s| s.timestamp_ns <= t);
        summary.last_sample = samples[..split].last().map(|s| ImuSample {
            timestamp_ns: t,
            ..*s
        });
        summary.extend(&samples[split..], params);
        summary
    }

    pub fn is_identity(&self) -> bool {
        self.dt == 0.0
    }

    /// Timestamp of the last sample folded in, if any.
    pub fn last_sample_ns(&self) -> Option<Timestamp> {
        self.last_sample.map(|s| s.timestamp_ns)
    }

    /// Integrate one reading held constant for `dt` seconds.
    pub fn integrate_measurement(
        &mut self,
        accel: &Vector3<f64>,
        gyro: &Vector3<f64>,
        dt: f64,
        params: &ImuParams,
    ) {
        if dt <= 0.0 {
            return;
        }
        let dt2 = dt * dt;
        let a = accel - self.bias_hat.accel;
        let w = gyro - self.bias_hat.gyro;

        let phi = w * dt;
        let inc = so3::exp(&phi);
        let inc_m = inc.to_rotation_matrix().into_inner();
        let jr = so3::right_jacobian(&phi);
        let r = self.delta_rot.to_rotation_matrix().into_inner();
        let a_hat = so3::skew(&a);
        let r_a_hat = r * a_hat;

        // Covariance.
        let mut a_mat = Matrix9::identity();
        a_mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&inc_m.transpose());
        a_mat.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-r_a_hat * dt));
        a_mat
            .fixed_view_mut::<3, 3>(6, 0)
            .copy_from(&(-0.5 * r_a_hat * dt2));
        a_mat
            .fixed_view_mut::<3, 3>(6, 3)
            .copy_from(&(Matrix3::identity() * dt));

        let mut b_mat = Matrix9x6::zeros();
        b_mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&(jr * dt));
        b_mat.fixed_view_mut::<3, 3>(3, 3).copy_from(&(r * dt));
        b_mat.fixed_view_mut::<3, 3>(6, 3).copy_from(&(0.5 * r * dt2));

        let mut q = Matrix6::zeros();
        let gyro_var = params.gyro_noise_density.powi(2) / dt;
        let accel_var = params.accel_noise_density.powi(2) / dt;
        for i in 0..3 {
            q[(i, i)] = gyro_var;
            q[(i + 3, i + 3)] = accel_var;
        }

        self.covariance =
            a_mat * self.covariance * a_mat.transpose() + b_mat * q * b_mat.transpose();
        let int_var = params.integration_sigma.powi(2) * dt;
        for i in 6..9 {
            self.covariance[(i, i)] += int_var;
        }

        // Bias Jacobians, using the rotation before this step.
        self.d_pos_d_ba += self.d_vel_d_ba * dt - 0.5 * r * dt2;
        self.d_pos_d_bg += self.d_vel_d_bg * dt - 0.5 * r_a_hat * self.d_rot_d_bg * dt2;
        self.d_vel_d_ba -= r * dt;
        self.d_vel_d_bg -= r_a_hat * self.d_rot_d_bg * dt;
        self.d_rot_d_bg = inc_m.transpose() * self.d_rot_d_bg - jr * dt;

        // Deltas.
        let acc_nav = r * a;
        self.delta_pos += self.delta_vel * dt + 0.5 * acc_nav * dt2;
        self.delta_vel += acc_nav * dt;
        self.delta_rot = UnitQuaternion::new_normalize((self.delta_rot * inc).into_inner());
        self.dt += dt;
    }

    /// Fold in samples arriving after the last one integrated. The previous
    /// reading is held until each new sample's timestamp. Samples that are
    /// not strictly newer are skipped. Returns how many were folded in.
    pub fn extend(&mut self, samples: &[ImuSample], params: &ImuParams) -> usize {
        let mut folded = 0;
        for sample in samples {
            match self.last_sample {
                Some(prev) if sample.timestamp_ns <= prev.timestamp_ns => continue,
                Some(prev) => {
                    let dt = ns_to_sec(sample.timestamp_ns - prev.timestamp_ns);
                    self.integrate_measurement(&prev.accel, &prev.gyro, dt, params);
                }
                None => {
                    if self.is_identity() {
                        self.start_ns = sample.timestamp_ns;
                    }
                }
            }
            self.end_ns = sample.timestamp_ns;
            self.last_sample = Some(*sample);
            folded += 1;
        }
        folded
    }

    /// Deltas corrected to first order for a bias different from `bias_hat`.
    pub fn bias_corrected_deltas(
        &self,
        bias: &ImuBias,
    ) -> (UnitQuaternion<f64>, Vector3<f64>, Vector3<f64>) {
        let dbg = bias.gyro - self.bias_hat.gyro;
        let dba = bias.accel - self.bias_hat.accel;

        let rot = self.delta_rot * so3::exp(&(self.d_rot_d_bg * dbg));
        let vel = self.delta_vel + self.d_vel_d_ba * dba + self.d_vel_d_bg * dbg;
        let pos = self.delta_pos + self.d_pos_d_ba * dba + self.d_pos_d_bg * dbg;
        (rot, vel, pos)
    }

    /// Propagate `state` across this interval.
    pub fn predict(&self, state: &NavState, bias: &ImuBias, gravity: &Vector3<f64>) -> NavState {
        let (d_rot, d_vel, d_pos) = self.bias_corrected_deltas(bias);
        let dt = self.dt;
        let g = *gravity;
        let rot_i = state.pose.rotation;

        let rotation = rot_i * d_rot;
        let velocity = state.velocity + g * dt + rot_i * d_vel;
        let translation = state.pose.translation
            + state.velocity * dt
            + 0.5 * g * dt * dt
            + rot_i * d_pos;

        NavState::new(SE3::new(rotation, translation), velocity)
    }
}

/// Integrate `samples` over `[start, end]` with a zero-order hold.
///
/// The first sample is held back to `start`; each sample is held until the
/// next one or `end`. Samples outside the range are ignored.
pub fn integrate_range(
    start: Timestamp,
    end: Timestamp,
    samples: &[ImuSample],
    bias: ImuBias,
    params: &ImuParams,
) -> Result<PreintegratedSummary, ImuError> {
    let in_range = check_range(start, end, samples)?;
    let mut summary = PreintegratedSummary::identity(bias, start);
    summary.end_ns = end;

    hold_each(start, end, in_range, |sample, dt| {
        summary.integrate_measurement(&sample.accel, &sample.gyro, dt, params);
    });
    summary.last_sample = in_range.last().copied();
    Ok(summary)
}

/// Rotation-only counterpart of [`integrate_range`].
pub fn integrate_gyro_range(
    start: Timestamp,
    end: Timestamp,
    samples: &[ImuSample],
    gyro_bias: &Vector3<f64>,
) -> Result<UnitQuaternion<f64>, ImuError> {
    let in_range = check_range(start, end, samples)?;
    let mut rot = UnitQuaternion::identity();
    hold_each(start, end, in_range, |sample, dt| {
        rot *= so3::exp(&((sample.gyro - gyro_bias) * dt));
    });
    Ok(rot)
}

fn check_range(
    start: Timestamp,
    end: Timestamp,
    samples: &[ImuSample],
) -> Result<&[ImuSample], ImuError> {
    if end < start {
        return Err(ImuError::InvalidTimeRange { start, end });
    }
    let lo = samples.partition_point(|s| s.timestamp_ns < start);
    let hi = samples.partition_point(|s| s.timestamp_ns <= end);
    let in_range = &samples[lo..hi.max(lo)];
    if start < end && in_range.is_empty() {
        return Err(ImuError::InsufficientData { start, end });
    }
    Ok(in_range)
}

fn hold_each<F>(start: Timestamp, end: Timestamp, samples: &[ImuSample], mut f: F)
where
    F: FnMut(&ImuSample, f64),
{
    let mut t = start;
    for (i, sample) in samples.iter().enumerate() {
        let next = samples
            .get(i + 1)
            .map_or(end, |n| n.timestamp_ns)
            .min(end);
        if next > t {
            f(sample, ns_to_sec(next - t));
            t = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn constant(
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        timestamps: impl Iterator<Item = Timestamp>,
    ) -> Vec<ImuSample> {
        timestamps.map(|t| ImuSample::new(t, accel, gyro)).collect()
    }

    #[test]
    fn test_constant_acceleration_scenario() {
        let samples = constant(
            Vector3::new(0.0, 0.0, 9.8),
            Vector3::zeros(),
            (1..=10).map(|i| i * 100),
        );
        let summary =
            integrate_range(100, 1000, &samples, ImuBias::zero(), &ImuParams::default()).unwrap();

        let dt = 900e-9;
        assert_relative_eq!(summary.dt, dt, epsilon = 1e-15);
        assert_relative_eq!(summary.delta_vel, Vector3::new(0.0, 0.0, 9.8 * dt), epsilon = 1e-15);
        assert_relative_eq!(
            summary.delta_pos,
            Vector3::new(0.0, 0.0, 0.5 * 9.8 * dt * dt),
            epsilon = 1e-20
        );
        assert_relative_eq!(summary.delta_rot.angle(), 0.0);
    }

    #[test]
    fn test_degenerate_and_invalid_ranges() {
        let params = ImuParams::default();
        let samples = constant(Vector3::zeros(), Vector3::zeros(), [10, 20].into_iter());

        let identity = integrate_range(5, 5, &samples, ImuBias::zero(), &params).unwrap();
        assert!(identity.is_identity());
        assert_eq!(identity.covariance, Matrix9::zeros());

        assert_eq!(
            integrate_range(30, 40, &samples, ImuBias::zero(), &params),
            Err(ImuError::InsufficientData { start: 30, end: 40 })
        );
        assert_eq!(
            integrate_range(20, 10, &samples, ImuBias::zero(), &params),
            Err(ImuError::InvalidTimeRange { start: 20, end: 10 })
        );
    }

    #[test]
    fn test_first_sample_held_back_to_start() {
        let samples = constant(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), [500].into_iter());
        let summary =
            integrate_range(0, 1000, &samples, ImuBias::zero(), &ImuParams::default()).unwrap();
        assert_relative_eq!(summary.dt, 1000e-9, epsilon = 1e-18);
    }

    #[test]
    fn test_rotation_about_z() {
        // 1 s at π/2 rad/s.
        let samples = constant(
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, FRAC_PI_2),
            (0..=100).map(|i| i * 10_000_000),
        );
        let summary = integrate_range(
            0,
            1_000_000_000,
            &samples,
            ImuBias::zero(),
            &ImuParams::default(),
        )
        .unwrap();
        assert_relative_eq!(summary.delta_rot.angle(), FRAC_PI_2, epsilon = 1e-9);

        let gyro_only =
            integrate_gyro_range(0, 1_000_000_000, &samples, &Vector3::zeros()).unwrap();
        assert_relative_eq!(gyro_only.angle_to(&summary.delta_rot), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_extend_matches_range_integration() {
        let params = ImuParams::default();
        let samples = constant(
            Vector3::new(0.3, -0.1, 9.7),
            Vector3::new(0.01, 0.02, -0.03),
            (0..=50).map(|i| i * 5_000_000),
        );
        let batch = integrate_range(0, 250_000_000, &samples, ImuBias::zero(), &params).unwrap();

        let mut incremental = PreintegratedSummary::identity(ImuBias::zero(), 0);
        assert_eq!(incremental.extend(&samples[..20], &params), 20);
        // Overlapping batch: already integrated samples are skipped.
        assert_eq!(incremental.extend(&samples[10..], &params), 31);

        assert_relative_eq!(incremental.dt, batch.dt, epsilon = 1e-12);
        assert_relative_eq!(incremental.delta_vel, batch.delta_vel, epsilon = 1e-12);
        assert_relative_eq!(incremental.delta_pos, batch.delta_pos, epsilon = 1e-12);
        assert_eq!(incremental.last_sample_ns(), Some(250_000_000));
    }

    #[test]
    fn test_anchored_replays_samples_past_anchor() {
        let params = ImuParams::default();
        let samples = constant(
            Vector3::new(0.3, 0.0, 9.8),
            Vector3::new(0.0, 0.02, 0.0),
            (0..=40).map(|i| i * 5_000_000),
        );
        // Anchor between two samples: the reading at 95 ms is held from 97 ms.
        let anchor = 97_000_000;
        let summary = PreintegratedSummary::anchored(ImuBias::zero(), anchor, &samples, &params);
        let mut held = samples[19];
        held.timestamp_ns = anchor;
        let mut expected_samples = vec![held];
        expected_samples.extend_from_slice(&samples[20..]);
        let expected =
            integrate_range(anchor, 200_000_000, &expected_samples, ImuBias::zero(), &params)
                .unwrap();

        assert_eq!((summary.start_ns, summary.end_ns), (anchor, 200_000_000));
        assert_relative_eq!(summary.dt, 103e-3, epsilon = 1e-12);
        assert_relative_eq!(summary.delta_vel, expected.delta_vel, epsilon = 1e-12);
        assert_relative_eq!(summary.delta_pos, expected.delta_pos, epsilon = 1e-12);

        let empty = PreintegratedSummary::anchored(ImuBias::zero(), 300_000_000, &samples, &params);
        assert!(empty.is_identity());
        assert_eq!(empty.last_sample_ns(), Some(300_000_000));
    }

    #[test]
    fn test_covariance_grows_and_stays_symmetric() {
        let samples = constant(
            Vector3::new(0.0, 0.0, 9.81),
            Vector3::new(0.1, 0.0, 0.0),
            (0..=20).map(|i| i * 5_000_000),
        );
        let summary =
            integrate_range(0, 100_000_000, &samples, ImuBias::zero(), &ImuParams::default())
                .unwrap();
        let cov = summary.covariance;
        assert_relative_eq!(cov, cov.transpose(), epsilon = 1e-15);
        for i in 0..9 {
            assert!(cov[(i, i)] > 0.0);
        }
    }

    #[test]
    fn test_bias_correction_matches_reintegration() {
        let params = ImuParams::default();
        let samples = constant(
            Vector3::new(0.2, 0.1, 9.8),
            Vector3::new(0.05, -0.02, 0.1),
            (0..=40).map(|i| i * 5_000_000),
        );
        let end = 200_000_000;
        let nominal = integrate_range(0, end, &samples, ImuBias::zero(), &params).unwrap();

        let perturbed = ImuBias::new(Vector3::new(0.01, -0.02, 0.01), Vector3::new(1e-3, 0.0, -1e-3));
        let exact = integrate_range(0, end, &samples, perturbed, &params).unwrap();
        let (rot, vel, pos) = nominal.bias_corrected_deltas(&perturbed);

        assert_relative_eq!(rot.angle_to(&exact.delta_rot), 0.0, epsilon = 1e-6);
        assert_relative_eq!(vel, exact.delta_vel, epsilon = 1e-5);
        assert_relative_eq!(pos, exact.delta_pos, epsilon = 1e-6);
    }

    #[test]
    fn test_predict_free_fall_cancels_gravity() {
        // A stationary IMU measures +g upward; prediction must stay put.
        let params = ImuParams::default();
        let samples = constant(-params.gravity, Vector3::zeros(), (0..=10).map(|i| i * 10_000_000));
        let summary = integrate_range(0, 100_000_000, &samples, ImuBias::zero(), &params).unwrap();

        let start = NavState::default();
        let predicted = summary.predict(&start, &ImuBias::zero(), &params.gravity);
        assert_relative_eq!(predicted.velocity, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(predicted.pose.translation, Vector3::zeros(), epsilon = 1e-12);
    }
}

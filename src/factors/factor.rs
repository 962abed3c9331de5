//! Factor variants understood by the backend.
//!
//! Each factor names the variables it touches and can evaluate its robust
//! loss against a set of [`Values`]. The engine owns the actual solve.
//!
//! # IMU residual
//!
//! For keyframes i and j connected by a preintegrated summary, with the
//! deltas corrected to the bias at i:
//!
//! ```text
//! r = [ Log(ΔRᵀ · R_iᵀ · R_j)                          ]
//!     [ R_iᵀ · (v_j - v_i - g·Δt) - Δv                 ]
//!     [ R_iᵀ · (p_j - p_i - v_i·Δt - ½·g·Δt²) - Δp     ]
//! ```

use nalgebra::{DMatrix, DVector, Vector3};

use super::keys::VariableKey;
use super::noise::{NoiseModel, RobustKernel};
use super::values::Values;
use crate::geometry::{triangulate_views, StereoCamera, TriangulationThresholds, SE3};
use crate::imu::{ImuBias, PreintegratedSummary};
use crate::landmarks::{FrameId, LandmarkId, PlaneId, StereoObservation};

/// Regularization added to the IMU covariance before inversion.
const IMU_COVARIANCE_JITTER: f64 = 1e-12;

/// Vision factor that constrains poses through a landmark without an
/// explicit point variable. The point is eliminated on evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructurelessFactor {
    pub landmark: LandmarkId,
    pub observations: Vec<(FrameId, StereoObservation)>,
    pub camera: StereoCamera,
    pub pixel_sigma: f64,
    pub kernel: RobustKernel,
}

impl StructurelessFactor {
    /// Add an observation, replacing any previous one from the same frame.
    pub fn push(&mut self, frame: FrameId, observation: StereoObservation) {
        match self.observations.binary_search_by_key(&frame, |(f, _)| *f) {
            Ok(i) => self.observations[i].1 = observation,
            Err(i) => self.observations.insert(i, (frame, observation)),
        }
    }
}

/// Stereo reprojection of an explicit landmark point into one keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionFactor {
    pub frame: FrameId,
    pub landmark: LandmarkId,
    pub observation: StereoObservation,
    pub camera: StereoCamera,
    pub pixel_sigma: f64,
    pub kernel: RobustKernel,
}

/// Signed distance of a landmark point to a plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPlaneFactor {
    pub landmark: LandmarkId,
    pub plane: PlaneId,
    pub noise: NoiseModel,
}

/// Preintegrated inertial constraint between consecutive keyframes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuFactor {
    pub from: FrameId,
    pub to: FrameId,
    pub summary: PreintegratedSummary,
    pub gravity: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Factor {
    Structureless(StructurelessFactor),
    Projection(ProjectionFactor),
    PointPlane(PointPlaneFactor),
    Imu(ImuFactor),
    /// Bias random walk between consecutive keyframes.
    BiasBetween {
        from: FrameId,
        to: FrameId,
        noise: NoiseModel,
    },
    PosePrior {
        frame: FrameId,
        pose: SE3,
        noise: NoiseModel,
    },
    VelocityPrior {
        frame: FrameId,
        velocity: Vector3<f64>,
        noise: NoiseModel,
    },
    BiasPrior {
        frame: FrameId,
        bias: ImuBias,
        noise: NoiseModel,
    },
    ZeroVelocity {
        frame: FrameId,
        noise: NoiseModel,
    },
    /// Identity relative pose between two keyframes.
    NoMotion {
        from: FrameId,
        to: FrameId,
        noise: NoiseModel,
    },
    ConstantVelocity {
        from: FrameId,
        to: FrameId,
        noise: NoiseModel,
    },
    /// Relative pose measured by stereo RANSAC.
    StereoBetween {
        from: FrameId,
        to: FrameId,
        relative: SE3,
        noise: NoiseModel,
    },
}

/// Variant tag, for logging and bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactorKind {
    Structureless,
    Projection,
    PointPlane,
    Imu,
    BiasBetween,
    PosePrior,
    VelocityPrior,
    BiasPrior,
    ZeroVelocity,
    NoMotion,
    ConstantVelocity,
    StereoBetween,
}

impl Factor {
    pub fn kind(&self) -> FactorKind {
        match self {
            Factor::Structureless(_) => FactorKind::Structureless,
            Factor::Projection(_) => FactorKind::Projection,
            Factor::PointPlane(_) => FactorKind::PointPlane,
            Factor::Imu(_) => FactorKind::Imu,
            Factor::BiasBetween { .. } => FactorKind::BiasBetween,
            Factor::PosePrior { .. } => FactorKind::PosePrior,
            Factor::VelocityPrior { .. } => FactorKind::VelocityPrior,
            Factor::BiasPrior { .. } => FactorKind::BiasPrior,
            Factor::ZeroVelocity { .. } => FactorKind::ZeroVelocity,
            Factor::NoMotion { .. } => FactorKind::NoMotion,
            Factor::ConstantVelocity { .. } => FactorKind::ConstantVelocity,
            Factor::StereoBetween { .. } => FactorKind::StereoBetween,
        }
    }

    /// Landmark this factor belongs to, for vision and regularity factors.
    pub fn landmark(&self) -> Option<LandmarkId> {
        match self {
            Factor::Structureless(f) => Some(f.landmark),
            Factor::Projection(f) => Some(f.landmark),
            Factor::PointPlane(f) => Some(f.landmark),
            _ => None,
        }
    }

    /// Variables this factor constrains.
    pub fn keys(&self) -> Vec<VariableKey> {
        use VariableKey::*;
        match self {
            Factor::Structureless(f) => f.observations.iter().map(|(fr, _)| Pose(*fr)).collect(),
            Factor::Projection(f) => vec![Pose(f.frame), Landmark(f.landmark)],
            Factor::PointPlane(f) => vec![Landmark(f.landmark), Plane(f.plane)],
            Factor::Imu(f) => vec![
                Pose(f.from),
                Velocity(f.from),
                Pose(f.to),
                Velocity(f.to),
                Bias(f.from),
            ],
            Factor::BiasBetween { from, to, .. } => vec![Bias(*from), Bias(*to)],
            Factor::PosePrior { frame, .. } => vec![Pose(*frame)],
            Factor::VelocityPrior { frame, .. } | Factor::ZeroVelocity { frame, .. } => {
                vec![Velocity(*frame)]
            }
            Factor::BiasPrior { frame, .. } => vec![Bias(*frame)],
            Factor::NoMotion { from, to, .. } | Factor::StereoBetween { from, to, .. } => {
                vec![Pose(*from), Pose(*to)]
            }
            Factor::ConstantVelocity { from, to, .. } => vec![Velocity(*from), Velocity(*to)],
        }
    }

    /// Robust loss at `values`. `None` when a variable is missing or the
    /// measurement cannot be evaluated (point behind the camera, landmark
    /// not triangulable).
    pub fn loss(&self, values: &Values) -> Option<f64> {
        match self {
            Factor::Structureless(f) => structureless_loss(f, values),
            Factor::Projection(f) => {
                let pose = values.pose(f.frame)?;
                let point = values.point(f.landmark)?;
                let r = stereo_residual(&f.camera, &pose, &point, &f.observation)?;
                Some(f.kernel.loss(r.norm() / f.pixel_sigma))
            }
            Factor::PointPlane(f) => {
                let point = values.point(f.landmark)?;
                let plane = values.plane(f.plane)?;
                let r = DVector::from_element(1, plane.signed_distance(&point));
                Some(f.noise.loss(&r))
            }
            Factor::Imu(f) => imu_loss(f, values),
            Factor::BiasBetween { from, to, noise } => {
                let bi = values.bias(*from)?;
                let bj = values.bias(*to)?;
                Some(noise.loss(&bias_vector(&bi, &bj)))
            }
            Factor::PosePrior { frame, pose, noise } => {
                let x = values.pose(*frame)?;
                let r = pose.between(&x).tangent();
                Some(noise.loss(&DVector::from_column_slice(r.as_slice())))
            }
            Factor::VelocityPrior {
                frame,
                velocity,
                noise,
            } => {
                let v = values.velocity(*frame)?;
                Some(noise.loss(&dvec3(&(v - velocity))))
            }
            Factor::BiasPrior { frame, bias, noise } => {
                let b = values.bias(*frame)?;
                Some(noise.loss(&bias_vector(bias, &b)))
            }
            Factor::ZeroVelocity { frame, noise } => {
                let v = values.velocity(*frame)?;
                Some(noise.loss(&dvec3(&v)))
            }
            Factor::NoMotion { from, to, noise } => {
                let r = values.pose(*from)?.between(&values.pose(*to)?).tangent();
                Some(noise.loss(&DVector::from_column_slice(r.as_slice())))
            }
            Factor::ConstantVelocity { from, to, noise } => {
                let r = values.velocity(*to)? - values.velocity(*from)?;
                Some(noise.loss(&dvec3(&r)))
            }
            Factor::StereoBetween {
                from,
                to,
                relative,
                noise,
            } => {
                let measured = values.pose(*from)?.between(&values.pose(*to)?);
                let r = relative.between(&measured).tangent();
                Some(noise.loss(&DVector::from_column_slice(r.as_slice())))
            }
        }
    }
}

fn dvec3(v: &Vector3<f64>) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

/// `[accel_j - accel_i, gyro_j - gyro_i]`.
fn bias_vector(bi: &ImuBias, bj: &ImuBias) -> DVector<f64> {
    let da = bj.accel - bi.accel;
    let dg = bj.gyro - bi.gyro;
    DVector::from_iterator(6, da.iter().chain(dg.iter()).copied())
}

/// `[u_l, (u_r), v]` prediction minus measurement; the right coordinate is
/// dropped for monocular measurements.
fn stereo_residual(
    camera: &StereoCamera,
    world_t_body: &SE3,
    point: &Vector3<f64>,
    obs: &StereoObservation,
) -> Option<DVector<f64>> {
    let cam_t_world = camera.camera_pose(world_t_body).inverse();
    let predicted = camera.project(&cam_t_world.transform_point(point))?;
    Some(match obs.right_u {
        Some(ur) => DVector::from_vec(vec![
            predicted.x - obs.left.x,
            predicted.y - ur,
            predicted.z - obs.left.y,
        ]),
        None => DVector::from_vec(vec![predicted.x - obs.left.x, predicted.z - obs.left.y]),
    })
}

fn structureless_loss(f: &StructurelessFactor, values: &Values) -> Option<f64> {
    let mut views = Vec::with_capacity(f.observations.len());
    for (frame, obs) in &f.observations {
        let pose = values.pose(*frame)?;
        views.push((f.camera.camera_pose(&pose), f.camera.normalized(&obs.left)));
    }
    let thresholds = TriangulationThresholds {
        min_parallax: 0.0,
        max_mean_error: f64::INFINITY,
    };
    let point = triangulate_views(&views, &thresholds).ok()?.point;

    let mut total = 0.0;
    for (frame, obs) in &f.observations {
        let pose = values.pose(*frame)?;
        let r = stereo_residual(&f.camera, &pose, &point, obs)?;
        total += f.kernel.loss(r.norm() / f.pixel_sigma);
    }
    Some(total)
}

fn imu_loss(f: &ImuFactor, values: &Values) -> Option<f64> {
    let pose_i = values.pose(f.from)?;
    let vel_i = values.velocity(f.from)?;
    let pose_j = values.pose(f.to)?;
    let vel_j = values.velocity(f.to)?;
    let bias_i = values.bias(f.from)?;

    let (d_rot, d_vel, d_pos) = f.summary.bias_corrected_deltas(&bias_i);
    let dt = f.summary.dt;
    let g = f.gravity;
    let r_i_inv = pose_i.rotation.inverse();

    let rot = (d_rot.inverse() * r_i_inv * pose_j.rotation).scaled_axis();
    let vel = r_i_inv * (vel_j - vel_i - g * dt) - d_vel;
    let pos = r_i_inv
        * (pose_j.translation - pose_i.translation - vel_i * dt - 0.5 * g * dt * dt)
        - d_pos;

    let r = DVector::from_iterator(9, rot.iter().chain(vel.iter()).chain(pos.iter()).copied());
    let cov = DMatrix::from_column_slice(9, 9, f.summary.covariance.as_slice())
        + DMatrix::identity(9, 9) * IMU_COVARIANCE_JITTER;
    let noise = NoiseModel::from_covariance(cov)?;
    Some(noise.loss(&r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::values::Value;
    use crate::imu::{ImuParams, ImuSample};
    use crate::imu::preintegration::integrate_range;
    use approx::assert_relative_eq;

    fn camera() -> StereoCamera {
        StereoCamera::default()
    }

    fn observe(pose: &SE3, point: &Vector3<f64>) -> StereoObservation {
        let cam = camera();
        let p_cam = cam.camera_pose(pose).inverse().transform_point(point);
        let uv = cam.project(&p_cam).unwrap();
        StereoObservation::stereo(uv.x, uv.z, uv.y)
    }

    #[test]
    fn test_projection_zero_at_truth() {
        let pose = SE3::from_translation(Vector3::new(0.1, 0.0, 0.0));
        let point = Vector3::new(0.5, 0.2, 4.0);
        let factor = Factor::Projection(ProjectionFactor {
            frame: FrameId(0),
            landmark: LandmarkId(1),
            observation: observe(&pose, &point),
            camera: camera(),
            pixel_sigma: 1.0,
            kernel: RobustKernel::Huber(1.345),
        });

        let mut values = Values::new();
        values.insert(VariableKey::Pose(FrameId(0)), Value::Pose(pose));
        assert_eq!(factor.loss(&values), None);

        values.insert(VariableKey::Landmark(LandmarkId(1)), Value::Point(point));
        assert_relative_eq!(factor.loss(&values).unwrap(), 0.0, epsilon = 1e-12);
        assert_eq!(
            factor.keys(),
            vec![VariableKey::Pose(FrameId(0)), VariableKey::Landmark(LandmarkId(1))]
        );
        assert_eq!(factor.landmark(), Some(LandmarkId(1)));
    }

    #[test]
    fn test_structureless_zero_at_truth() {
        let point = Vector3::new(-0.3, 0.1, 5.0);
        let poses: Vec<_> = (0..3)
            .map(|i| SE3::from_translation(Vector3::new(0.2 * i as f64, 0.0, 0.0)))
            .collect();

        let mut values = Values::new();
        let mut factor = StructurelessFactor {
            landmark: LandmarkId(9),
            observations: Vec::new(),
            camera: camera(),
            pixel_sigma: 1.0,
            kernel: RobustKernel::L2,
        };
        for (i, pose) in poses.iter().enumerate() {
            values.insert(VariableKey::Pose(FrameId(i as u64)), Value::Pose(*pose));
            factor.push(FrameId(i as u64), observe(pose, &point));
        }
        let factor = Factor::Structureless(factor);
        assert_eq!(factor.keys().len(), 3);
        assert_relative_eq!(factor.loss(&values).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_imu_factor_zero_for_predicted_state() {
        let params = ImuParams::default();
        let samples: Vec<_> = (0..=20)
            .map(|i| {
                ImuSample::new(
                    i * 5_000_000,
                    Vector3::new(0.5, 0.0, 9.81),
                    Vector3::new(0.0, 0.0, 0.2),
                )
            })
            .collect();
        let summary =
            integrate_range(0, 100_000_000, &samples, ImuBias::zero(), &params).unwrap();

        let start = crate::imu::NavState::default();
        let end = summary.predict(&start, &ImuBias::zero(), &params.gravity);

        let mut values = Values::new();
        values.insert(VariableKey::Pose(FrameId(0)), Value::Pose(start.pose));
        values.insert(VariableKey::Velocity(FrameId(0)), Value::Velocity(start.velocity));
        values.insert(VariableKey::Pose(FrameId(1)), Value::Pose(end.pose));
        values.insert(VariableKey::Velocity(FrameId(1)), Value::Velocity(end.velocity));
        values.insert(VariableKey::Bias(FrameId(0)), Value::Bias(ImuBias::zero()));

        let factor = Factor::Imu(ImuFactor {
            from: FrameId(0),
            to: FrameId(1),
            summary,
            gravity: params.gravity,
        });
        assert!(factor.loss(&values).unwrap() < 1e-6);
    }

    #[test]
    fn test_motion_priors() {
        let mut values = Values::new();
        values.insert(VariableKey::Pose(FrameId(0)), Value::Pose(SE3::identity()));
        values.insert(VariableKey::Pose(FrameId(1)), Value::Pose(SE3::identity()));
        values.insert(VariableKey::Velocity(FrameId(1)), Value::Velocity(Vector3::x()));

        let no_motion = Factor::NoMotion {
            from: FrameId(0),
            to: FrameId(1),
            noise: NoiseModel::isotropic(6, 0.01),
        };
        assert_relative_eq!(no_motion.loss(&values).unwrap(), 0.0);

        let zero_velocity = Factor::ZeroVelocity {
            frame: FrameId(1),
            noise: NoiseModel::isotropic(3, 1.0),
        };
        assert_relative_eq!(zero_velocity.loss(&values).unwrap(), 0.5);
        assert_eq!(zero_velocity.kind(), FactorKind::ZeroVelocity);
    }
}

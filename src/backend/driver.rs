//! Incremental Estimation Driver - one estimation step per keyframe.
//!
//! A step:
//! 1. Reads the bias and the inertial summary since the previous keyframe
//!    (supplied, the shared accumulator, or cut from the buffer)
//! 2. Predicts the new keyframe's pose and velocity
//! 3. Records vision observations and feeds the lifecycle manager
//! 4. Erases landmarks without stereo support over the last
//!    `stereo_horizon` keyframes
//! 5. Promotes landmarks the modality wants structured
//! 6. Reconciles plane regions
//! 7. Drains lifecycle changes and adds inertial and motion factors
//! 8. Submits to the engine, absorbs slots and estimates
//! 9. Publishes the new bias and restarts the accumulator at the keyframe
//!
//! All work is staged on copies of the driver's state and committed only
//! when the engine accepts the submission.

use std::sync::Arc;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use super::config::BackendConfig;
use super::engine::{EngineError, OptimizationEngine, Submission};
use super::error::BackendError;
use super::inputs::{KeyframeInput, TrackingStatus, VisionUpdate};
use super::update::{EstimateUpdate, LandmarkEstimate, PlaneEstimate};
use crate::factors::{Factor, ImuFactor, NoiseModel, Ticket, Value, Values, VariableKey};
use crate::imu::preintegration::integrate_range;
use crate::imu::{
    ImuBias, ImuError, NavState, PreintegratedSummary, PreintegrationSnapshot, Timestamp,
};
use crate::landmarks::{FrameId, LandmarkId, LandmarkTrackTable};
use crate::lifecycle::{FactorLifecycleManager, LifecycleError, PlaneRegion};
use crate::system::SharedState;

/// Driver state that a step mutates. Staged as a copy and swapped in on
/// success.
#[derive(Debug, Clone, PartialEq)]
struct DriverState {
    tracks: LandmarkTrackTable,
    lifecycle: FactorLifecycleManager,
    /// Latest estimate of every keyframe variable.
    estimate: Values,
    last_keyframe: Option<(FrameId, Timestamp)>,
    next_frame: FrameId,
}

pub struct IncrementalEstimationDriver {
    config: BackendConfig,
    shared: Arc<SharedState>,
    state: DriverState,
    /// Pose and velocity assumed for the first keyframe.
    initial_state: NavState,
}

impl IncrementalEstimationDriver {
    pub fn new(config: BackendConfig, shared: Arc<SharedState>, initial_state: NavState) -> Self {
        Self {
            state: DriverState {
                tracks: LandmarkTrackTable::new(),
                lifecycle: FactorLifecycleManager::new(config.lifecycle, config.camera),
                estimate: Values::new(),
                last_keyframe: None,
                next_frame: FrameId(0),
            },
            config,
            shared,
            initial_state,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn tracks(&self) -> &LandmarkTrackTable {
        &self.state.tracks
    }

    pub fn lifecycle(&self) -> &FactorLifecycleManager {
        &self.state.lifecycle
    }

    pub fn estimate(&self) -> &Values {
        &self.state.estimate
    }

    pub fn last_keyframe(&self) -> Option<FrameId> {
        self.state.last_keyframe.map(|(f, _)| f)
    }

    /// Run one estimation step. On error nothing is committed: the track
    /// table, lifecycle manager, estimate and bias are as before the call.
    pub fn step<E>(
        &mut self,
        input: KeyframeInput,
        engine: &mut E,
    ) -> Result<EstimateUpdate, BackendError>
    where
        E: OptimizationEngine + ?Sized,
    {
        let mut staged = self.state.clone();
        let frame = staged.next_frame;

        if let Some((_, last_ts)) = staged.last_keyframe {
            if input.timestamp_ns <= last_ts {
                return Err(ImuError::NonMonotonicTimestamp {
                    timestamp: input.timestamp_ns,
                    last: last_ts,
                }
                .into());
            }
        }

        let snapshot = self.shared.preintegration.snapshot();
        let gravity = self.shared.preintegration.gravity();
        let bias = snapshot.bias;
        let summary = match (&input.preintegrated, staged.last_keyframe) {
            (Some(supplied), _) => supplied.clone(),
            (None, None) => PreintegratedSummary::identity(bias, input.timestamp_ns),
            (None, Some((_, prev_ts))) => {
                self.interval_summary(&snapshot, prev_ts, input.timestamp_ns)?
            }
        };

        let predicted = match staged.last_keyframe {
            Some((prev, _)) => {
                let prev_state = keyframe_state(&staged.estimate, prev).unwrap_or(self.initial_state);
                summary.predict(&prev_state, &bias, &gravity)
            }
            None => self.initial_state,
        };

        self.apply_vision(&mut staged, frame, &input.vision)?;
        self.prune_stale_landmarks(&mut staged, frame)?;

        let mut poses = staged.estimate.clone();
        poses.insert(VariableKey::Pose(frame), Value::Pose(predicted.pose));
        let promoted = self.promote_candidates(&mut staged, &poses, &input)?;

        let report = staged.lifecycle.reconcile_plane_regions(&input.planes);

        let changes = staged.lifecycle.pending_factors_and_deletions();
        let tickets: Vec<Ticket> = changes.new_factors.iter().map(|(t, _)| *t).collect();
        let mut submission = Submission {
            new_values: changes.new_values,
            new_factors: changes.new_factors.into_iter().map(|(_, f)| f).collect(),
            replacements: changes.replacements,
            deletions: changes.deletions,
        };
        submission
            .new_values
            .insert(VariableKey::Pose(frame), Value::Pose(predicted.pose));
        submission
            .new_values
            .insert(VariableKey::Velocity(frame), Value::Velocity(predicted.velocity));
        submission
            .new_values
            .insert(VariableKey::Bias(frame), Value::Bias(bias));
        let motion = self.motion_factors(
            staged.last_keyframe.map(|(f, _)| f),
            frame,
            &summary,
            gravity,
            bias,
            &input.vision,
        );
        submission.new_factors.extend(motion);

        let output = engine.update(&submission)?;
        if output.slots.len() != submission.new_factors.len() {
            return Err(BackendError::OptimizationFailed(
                EngineError::SlotCountMismatch {
                    expected: submission.new_factors.len(),
                    got: output.slots.len(),
                },
            ));
        }

        let assignments: Vec<_> = tickets
            .into_iter()
            .zip(output.slots.iter().copied())
            .collect();
        staged.lifecycle.absorb_slots(&assignments);
        staged.lifecycle.absorb_estimate(&output.values);
        staged.estimate.update_from(&output.values);

        let state = keyframe_state(&output.values, frame).unwrap_or(predicted);
        let estimated_bias = output.values.bias(frame).unwrap_or(bias);
        let update = EstimateUpdate {
            keyframe: frame,
            timestamp_ns: input.timestamp_ns,
            pose: state.pose,
            velocity: state.velocity,
            bias: estimated_bias,
            landmarks: staged
                .lifecycle
                .structured_landmarks()
                .filter_map(|id| {
                    output
                        .values
                        .point(id)
                        .map(|position| LandmarkEstimate { id, position })
                })
                .collect(),
            planes: staged
                .lifecycle
                .plane_ids()
                .filter_map(|id| output.values.plane(id).map(|plane| PlaneEstimate { id, plane }))
                .collect(),
        };

        staged.last_keyframe = Some((frame, input.timestamp_ns));
        staged.next_frame = frame.next();
        self.state = staged;

        self.shared.preintegration.update_bias(estimated_bias);
        self.shared.rebase_at(input.timestamp_ns);

        info!(
            "[Backend] {} at {} ns: {} factors (+{} promoted, {} planes new, {} detached), {} landmarks tracked",
            frame,
            input.timestamp_ns,
            submission.new_factors.len(),
            promoted,
            report.new_planes,
            report.detached + report.outliers,
            self.state.lifecycle.landmark_count()
        );
        Ok(update)
    }

    /// Inertial summary over `[start, end]`: the shared accumulator when it
    /// spans exactly that interval on the snapshot bias, otherwise integrated
    /// from the buffered samples.
    fn interval_summary(
        &self,
        snapshot: &PreintegrationSnapshot,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<PreintegratedSummary, BackendError> {
        let accumulator = &snapshot.accumulator;
        if snapshot.rebased && accumulator.start_ns == start && accumulator.end_ns == end {
            return Ok(accumulator.clone());
        }

        let newest = self.shared.imu_buffer.newest_timestamp();
        if newest.map_or(true, |n| n < end) {
            return Err(ImuError::DataNotYetAvailable {
                requested: end,
                newest,
            }
            .into());
        }
        let mut samples = self.shared.imu_buffer.covering(start, end);
        if let Some(held) = samples.first_mut() {
            held.timestamp_ns = held.timestamp_ns.max(start);
        }
        debug!(
            "[Backend] Accumulator spans {}..{} ns, cutting {}..{} ns from the buffer",
            accumulator.start_ns, accumulator.end_ns, start, end
        );
        Ok(integrate_range(
            start,
            end,
            &samples,
            snapshot.bias,
            self.shared.preintegration.params(),
        )?)
    }

    /// Record observations and feed the lifecycle manager.
    fn apply_vision(
        &self,
        staged: &mut DriverState,
        frame: FrameId,
        vision: &VisionUpdate,
    ) -> Result<(), BackendError> {
        for &(landmark, observation) in &vision.observations {
            if let Err(e) = staged.tracks.add_observation(landmark, frame, observation) {
                warn!("[Backend] Skipping observation: {}", e);
                continue;
            }
            if staged.lifecycle.contains(landmark) {
                staged
                    .lifecycle
                    .add_observation(landmark, frame, observation)?;
            } else if let Some(track) = staged.tracks.track(landmark) {
                if track.len() >= self.config.min_track_length {
                    staged.lifecycle.add_landmark(landmark, track)?;
                }
            }
        }
        Ok(())
    }

    /// Erase landmarks tracked for at least `stereo_horizon` keyframes
    /// without a valid stereo observation in the last `stereo_horizon`.
    /// Younger tracks are left alone.
    fn prune_stale_landmarks(
        &self,
        staged: &mut DriverState,
        frame: FrameId,
    ) -> Result<(), BackendError> {
        let horizon = self.config.stereo_horizon as u64;
        if horizon == 0 || frame.0 + 1 < horizon {
            return Ok(());
        }
        let window_start = FrameId(frame.0 + 1 - horizon);
        let stale: Vec<LandmarkId> = staged
            .tracks
            .landmark_ids()
            .filter(|l| {
                staged.tracks.track(*l).map_or(false, |track| {
                    track.first_frame().map_or(false, |first| first <= window_start)
                        && track.stereo_count_since(window_start) == 0
                })
            })
            .collect();

        for landmark in &stale {
            let _ = staged.tracks.erase(*landmark);
            if staged.lifecycle.contains(*landmark) {
                staged.lifecycle.remove_landmark(*landmark)?;
            }
        }
        if !stale.is_empty() {
            debug!("[Backend] Erased {} stale landmarks at {}", stale.len(), frame);
        }
        Ok(())
    }

    /// Promote unstructured landmarks the modality wants structured.
    /// Degenerate ones are erased from the track table too.
    fn promote_candidates(
        &self,
        staged: &mut DriverState,
        poses: &Values,
        input: &KeyframeInput,
    ) -> Result<usize, BackendError> {
        if input.vision.status != TrackingStatus::Valid {
            return Ok(0);
        }
        let policy = *staged.lifecycle.policy();
        let candidates: Vec<LandmarkId> = staged
            .lifecycle
            .unstructured_landmarks()
            .filter(|l| policy.modality.promotes(on_any_plane(*l, &input.planes)))
            .filter(|l| {
                staged
                    .tracks
                    .track(*l)
                    .map_or(false, |t| t.len() >= policy.min_observations)
            })
            .collect();

        let mut promoted = 0;
        for landmark in candidates {
            let Some(track) = staged.tracks.track(landmark) else {
                continue;
            };
            match staged.lifecycle.promote_to_structured(landmark, track, poses) {
                Ok(()) => promoted += 1,
                Err(LifecycleError::DegenerateLandmark { .. }) => {
                    let _ = staged.tracks.erase(landmark);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(promoted)
    }

    fn motion_factors(
        &self,
        prev: Option<FrameId>,
        frame: FrameId,
        summary: &PreintegratedSummary,
        gravity: Vector3<f64>,
        bias: ImuBias,
        vision: &VisionUpdate,
    ) -> Vec<Factor> {
        let c = &self.config;
        let mut factors = Vec::new();

        let Some(prev) = prev else {
            let pose_sigmas = [
                c.initial_rotation_sigma,
                c.initial_rotation_sigma,
                c.initial_rotation_sigma,
                c.initial_position_sigma,
                c.initial_position_sigma,
                c.initial_position_sigma,
            ];
            factors.push(Factor::PosePrior {
                frame,
                pose: self.initial_state.pose,
                noise: NoiseModel::diagonal(&pose_sigmas),
            });
            factors.push(Factor::VelocityPrior {
                frame,
                velocity: self.initial_state.velocity,
                noise: NoiseModel::isotropic(3, c.initial_velocity_sigma),
            });
            let bias_sigmas = [
                c.initial_accel_bias_sigma,
                c.initial_accel_bias_sigma,
                c.initial_accel_bias_sigma,
                c.initial_gyro_bias_sigma,
                c.initial_gyro_bias_sigma,
                c.initial_gyro_bias_sigma,
            ];
            factors.push(Factor::BiasPrior {
                frame,
                bias,
                noise: NoiseModel::diagonal(&bias_sigmas),
            });
            return factors;
        };

        if summary.is_identity() {
            warn!("[Backend] No inertial data between {} and {}", prev, frame);
        } else {
            factors.push(Factor::Imu(ImuFactor {
                from: prev,
                to: frame,
                summary: summary.clone(),
                gravity,
            }));
        }
        factors.push(Factor::BiasBetween {
            from: prev,
            to: frame,
            noise: self.bias_random_walk(summary.dt),
        });

        match vision.status {
            TrackingStatus::LowDisparity => {
                factors.push(Factor::ZeroVelocity {
                    frame,
                    noise: NoiseModel::isotropic(3, c.zero_velocity_sigma),
                });
                factors.push(Factor::NoMotion {
                    from: prev,
                    to: frame,
                    noise: NoiseModel::diagonal(&[
                        c.no_motion_rotation_sigma,
                        c.no_motion_rotation_sigma,
                        c.no_motion_rotation_sigma,
                        c.no_motion_position_sigma,
                        c.no_motion_position_sigma,
                        c.no_motion_position_sigma,
                    ]),
                });
            }
            TrackingStatus::Valid if c.add_between_stereo_factors => {
                if let Some(relative) = vision.stereo_relative_pose {
                    factors.push(Factor::StereoBetween {
                        from: prev,
                        to: frame,
                        relative,
                        noise: NoiseModel::diagonal(&[
                            c.stereo_between_rotation_sigma,
                            c.stereo_between_rotation_sigma,
                            c.stereo_between_rotation_sigma,
                            c.stereo_between_position_sigma,
                            c.stereo_between_position_sigma,
                            c.stereo_between_position_sigma,
                        ]),
                    });
                }
            }
            _ => {}
        }

        if c.add_constant_velocity_factor {
            factors.push(Factor::ConstantVelocity {
                from: prev,
                to: frame,
                noise: NoiseModel::isotropic(3, c.constant_velocity_sigma),
            });
        }
        factors
    }

    /// Bias random walk over `dt` seconds.
    fn bias_random_walk(&self, dt: f64) -> NoiseModel {
        let params = self.shared.preintegration.params();
        let dt = dt.max(1e-3);
        let sa = params.accel_random_walk * dt.sqrt();
        let sg = params.gyro_random_walk * dt.sqrt();
        NoiseModel::diagonal(&[sa, sa, sa, sg, sg, sg])
    }
}

fn keyframe_state(values: &Values, frame: FrameId) -> Option<NavState> {
    Some(NavState::new(values.pose(frame)?, values.velocity(frame)?))
}

fn on_any_plane(landmark: LandmarkId, planes: &[PlaneRegion]) -> bool {
    planes.iter().any(|r| r.members.contains(&landmark))
}

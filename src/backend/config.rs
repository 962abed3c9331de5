//! Backend configuration.

use serde::{Deserialize, Serialize};

use crate::geometry::StereoCamera;
use crate::lifecycle::LifecyclePolicy;

/// Configuration of the estimation driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub camera: StereoCamera,
    pub lifecycle: LifecyclePolicy,

    /// Observations before a landmark enters the lifecycle.
    pub min_track_length: usize,
    /// Landmarks without a valid stereo observation in this many most
    /// recent keyframes are erased.
    pub stereo_horizon: usize,

    // First-keyframe priors.
    pub initial_position_sigma: f64,
    pub initial_rotation_sigma: f64,
    pub initial_velocity_sigma: f64,
    pub initial_accel_bias_sigma: f64,
    pub initial_gyro_bias_sigma: f64,

    // Low-disparity priors.
    pub zero_velocity_sigma: f64,
    pub no_motion_position_sigma: f64,
    pub no_motion_rotation_sigma: f64,

    pub add_constant_velocity_factor: bool,
    pub constant_velocity_sigma: f64,

    pub add_between_stereo_factors: bool,
    pub stereo_between_position_sigma: f64,
    pub stereo_between_rotation_sigma: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            camera: StereoCamera::default(),
            lifecycle: LifecyclePolicy::default(),
            min_track_length: 2,
            stereo_horizon: 5,
            initial_position_sigma: 1e-5,
            initial_rotation_sigma: 10f64.to_radians(),
            initial_velocity_sigma: 1e-3,
            initial_accel_bias_sigma: 0.1,
            initial_gyro_bias_sigma: 0.01,
            zero_velocity_sigma: 1e-3,
            no_motion_position_sigma: 1e-3,
            no_motion_rotation_sigma: 1e-4,
            add_constant_velocity_factor: false,
            constant_velocity_sigma: 1e-2,
            add_between_stereo_factors: true,
            stereo_between_position_sigma: 0.1,
            stereo_between_rotation_sigma: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_round_trip_and_defaults() {
        let config = BackendConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: BackendConfig =
            serde_json::from_str(r#"{"stereo_horizon": 8, "camera": {"baseline": 0.12}}"#).unwrap();
        assert_eq!(partial.stereo_horizon, 8);
        assert_eq!(partial.camera.baseline, 0.12);
        assert_eq!(partial.camera.fx, StereoCamera::default().fx);
        assert_eq!(partial.min_track_length, 2);
    }
}

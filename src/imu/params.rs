//! IMU noise model and preintegration parameters.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Continuous-time IMU noise densities and the navigation-frame gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuParams {
    /// Gyroscope white noise density (rad/s/√Hz).
    pub gyro_noise_density: f64,
    /// Accelerometer white noise density (m/s²/√Hz).
    pub accel_noise_density: f64,
    /// Gyroscope bias random walk (rad/s²/√Hz).
    pub gyro_random_walk: f64,
    /// Accelerometer bias random walk (m/s³/√Hz).
    pub accel_random_walk: f64,
    /// Position integration uncertainty added per second of integration.
    pub integration_sigma: f64,
    /// Gravity expressed in the navigation frame (m/s²).
    pub gravity: Vector3<f64>,
    /// Nominal sample rate (Hz), used only for diagnostics.
    pub nominal_rate_hz: f64,
}

impl Default for ImuParams {
    fn default() -> Self {
        // EuRoC ADIS16448 values.
        Self {
            gyro_noise_density: 1.6968e-4,
            accel_noise_density: 2.0e-3,
            gyro_random_walk: 1.9393e-5,
            accel_random_walk: 3.0e-3,
            integration_sigma: 1e-8,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            nominal_rate_hz: 200.0,
        }
    }
}

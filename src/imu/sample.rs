use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Monotonic sensor time in nanoseconds.
pub type Timestamp = u64;

/// Convert a nanosecond span to seconds.
#[inline]
pub fn ns_to_sec(ns: Timestamp) -> f64 {
    ns as f64 * 1e-9
}

/// Single IMU measurement, immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub timestamp_ns: Timestamp,
    /// Specific force in the body frame (m/s^2).
    pub accel: Vector3<f64>,
    /// Angular rate in the body frame (rad/s).
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    pub fn new(timestamp_ns: Timestamp, accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            accel,
            gyro,
        }
    }
}

/// Accelerometer and gyroscope biases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuBias {
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

impl ImuBias {
    pub fn new(accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self { accel, gyro }
    }

    pub fn zero() -> Self {
        Self {
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
        }
    }
}

impl Default for ImuBias {
    fn default() -> Self {
        Self::zero()
    }
}

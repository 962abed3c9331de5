//! Fixed-size matrix aliases for preintegration.
//!
//! The preintegrated error state is ordered `[δθ, δv, δp]`; the measurement
//! noise is ordered `[gyro, accel]`.

use nalgebra::SMatrix;

/// 9×9 covariance of the preintegrated state.
pub type Matrix9 = SMatrix<f64, 9, 9>;

/// 9×6 noise-to-state Jacobian.
pub type Matrix9x6 = SMatrix<f64, 9, 6>;

/// 6×6 discrete measurement noise covariance.
pub type Matrix6 = SMatrix<f64, 6, 6>;

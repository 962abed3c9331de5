//! Rigid-body transform used for body poses and camera extrinsics.

use std::ops::Mul;

use nalgebra::{Matrix3, UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// SE(3) transform `T_target_source`: `p_target = R * p_source + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from a rotation matrix and translation.
    pub fn from_rt(rotation: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_matrix(rotation),
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// `self * other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Relative transform `self⁻¹ * other`.
    pub fn between(&self, other: &SE3) -> Self {
        self.inverse().compose(other)
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// `[rotation vector, translation]`, a first-order chart around identity.
    pub fn tangent(&self) -> Vector6<f64> {
        let w = self.rotation.scaled_axis();
        Vector6::new(
            w.x,
            w.y,
            w.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        )
    }

    /// Rotation angle (rad) and translation norm of this transform.
    pub fn magnitude(&self) -> (f64, f64) {
        (self.rotation.angle(), self.translation.norm())
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: SE3) -> SE3 {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_composes_to_identity() {
        let t = SE3::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let id = t.compose(&t.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_between_recovers_relative_motion() {
        let a = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
            Vector3::new(2.0, 1.0, 0.0),
        );
        let rel = a.between(&b);

        assert_relative_eq!(a.compose(&rel).translation, b.translation, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_point() {
        let t = SE3::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let p = t.transform_point(&Vector3::new(1.0, 0.0, 0.0));

        assert_relative_eq!(p, Vector3::new(0.0, 1.0, 1.0), epsilon = 1e-12);
    }
}

//! SO(3) helpers for on-manifold preintegration.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Below this rotation angle the closed forms switch to Taylor expansions.
const SMALL_ANGLE: f64 = 1e-6;

/// Hat operator: `skew(v) * u == v.cross(&u)`.
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map from a rotation vector.
#[inline]
pub fn exp(phi: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*phi)
}

/// Right Jacobian of SO(3):
///
/// ```text
/// Jr(φ) = I - (1 - cos θ)/θ² [φ]× + (θ - sin θ)/θ³ [φ]×²,   θ = |φ|
/// ```
pub fn right_jacobian(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let hat = skew(phi);

    if theta < SMALL_ANGLE {
        return Matrix3::identity() - 0.5 * hat;
    }

    let theta_sq = theta * theta;
    Matrix3::identity() - ((1.0 - theta.cos()) / theta_sq) * hat
        + ((theta - theta.sin()) / (theta_sq * theta)) * hat * hat
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross_product() {
        let v = Vector3::new(1.0, -2.0, 0.5);
        let u = Vector3::new(0.3, 4.0, -1.0);

        assert_relative_eq!(skew(&v) * u, v.cross(&u), epsilon = 1e-12);
    }

    #[test]
    fn test_right_jacobian_is_identity_at_origin() {
        assert_relative_eq!(
            right_jacobian(&Vector3::zeros()),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_right_jacobian_first_order() {
        // Exp(φ + δ) ≈ Exp(φ) Exp(Jr(φ) δ)
        let phi = Vector3::new(0.2, -0.1, 0.4);
        let delta = Vector3::new(1e-6, -2e-6, 0.5e-6);

        let lhs = exp(&(phi + delta));
        let rhs = exp(&phi) * exp(&(right_jacobian(&phi) * delta));

        assert_relative_eq!(lhs.angle_to(&rhs), 0.0, epsilon = 1e-10);
    }
}

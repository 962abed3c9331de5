//! Infinite plane in Hessian normal form.

use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};

/// Plane `{p : n·p = d}` with unit normal `n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedPlane {
    pub normal: Unit<Vector3<f64>>,
    pub distance: f64,
}

impl OrientedPlane {
    /// The normal is normalized; `None` for a zero normal.
    pub fn new(normal: Vector3<f64>, distance: f64) -> Option<Self> {
        Unit::try_new(normal, 1e-12).map(|normal| Self { normal, distance })
    }

    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(point) - self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_signed_distance() {
        let floor = OrientedPlane::new(Vector3::new(0.0, 0.0, 2.0), 1.0).unwrap();
        assert_relative_eq!(floor.signed_distance(&Vector3::new(3.0, -1.0, 1.5)), 0.5);
        assert_relative_eq!(floor.signed_distance(&Vector3::new(0.0, 0.0, 1.0)), 0.0);
        assert!(OrientedPlane::new(Vector3::zeros(), 1.0).is_none());
    }
}

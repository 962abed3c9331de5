//! Rectified stereo camera model.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::SE3;

/// Rectified stereo pair: shared pinhole intrinsics, horizontal baseline,
/// and the left camera's pose in the body frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Distance between the optical centers (m).
    pub baseline: f64,
    /// `T_body_leftcam`.
    pub body_t_cam: SE3,
}

impl Default for StereoCamera {
    fn default() -> Self {
        // EuRoC cam0 rectified, roughly.
        Self {
            fx: 458.654,
            fy: 457.296,
            cx: 367.215,
            cy: 248.375,
            baseline: 0.110,
            body_t_cam: SE3::identity(),
        }
    }
}

impl StereoCamera {
    /// Normalized image coordinates (z = 1) of a left pixel.
    pub fn normalized(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        )
    }

    /// Back-project a stereo pixel pair into the left camera frame.
    ///
    /// Returns `None` for non-positive disparity.
    pub fn back_project(&self, left: &Vector2<f64>, right_u: f64) -> Option<Vector3<f64>> {
        let disparity = left.x - right_u;
        if disparity <= 0.0 {
            return None;
        }
        let depth = self.fx * self.baseline / disparity;
        Some(self.normalized(left) * depth)
    }

    /// Project a point in the left camera frame to `(u_left, u_right, v)`.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector3<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let inv_z = 1.0 / p_cam.z;
        let u = self.fx * p_cam.x * inv_z + self.cx;
        let v = self.fy * p_cam.y * inv_z + self.cy;
        Some(Vector3::new(u, u - self.fx * self.baseline * inv_z, v))
    }

    /// World pose of the left camera given the body pose.
    pub fn camera_pose(&self, world_t_body: &SE3) -> SE3 {
        world_t_body.compose(&self.body_t_cam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_back_project_agree() {
        let cam = StereoCamera::default();
        let p = Vector3::new(0.4, -0.2, 3.0);
        let uv = cam.project(&p).unwrap();

        let back = cam.back_project(&Vector2::new(uv.x, uv.z), uv.y).unwrap();
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn test_non_positive_disparity_rejected() {
        let cam = StereoCamera::default();
        assert!(cam.back_project(&Vector2::new(100.0, 50.0), 100.0).is_none());
        assert!(cam.back_project(&Vector2::new(100.0, 50.0), 120.0).is_none());
    }
}

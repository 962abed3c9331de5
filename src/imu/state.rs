//! Navigation state of the body.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::SE3;

/// Body pose in the world frame plus world-frame velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavState {
    pub pose: SE3,
    pub velocity: Vector3<f64>,
}

impl NavState {
    pub fn new(pose: SE3, velocity: Vector3<f64>) -> Self {
        Self { pose, velocity }
    }

    pub fn at_rest(pose: SE3) -> Self {
        Self {
            pose,
            velocity: Vector3::zeros(),
        }
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::at_rest(SE3::identity())
    }
}

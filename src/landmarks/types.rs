//! Identifiers and per-frame observations.

use std::fmt;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Identifier of a tracked 3D landmark, assigned by the vision front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LandmarkId(pub u64);

impl LandmarkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Identifier of a keyframe. Increases with time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Identifier of a planar region, assigned by the plane detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaneId(pub u64);

impl PlaneId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// One rectified stereo measurement of a landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoObservation {
    /// Left-image pixel `(u, v)`.
    pub left: Vector2<f64>,
    /// Right-image `u`; `None` when stereo matching failed.
    pub right_u: Option<f64>,
}

impl StereoObservation {
    pub fn stereo(u_left: f64, v: f64, u_right: f64) -> Self {
        Self {
            left: Vector2::new(u_left, v),
            right_u: Some(u_right),
        }
    }

    pub fn mono(u_left: f64, v: f64) -> Self {
        Self {
            left: Vector2::new(u_left, v),
            right_u: None,
        }
    }

    /// True when the right measurement exists with positive disparity.
    pub fn has_valid_stereo(&self) -> bool {
        self.right_u.map_or(false, |ur| self.left.x - ur > 0.0)
    }
}

//! State produced by one estimation step.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::{OrientedPlane, SE3};
use crate::imu::{ImuBias, Timestamp};
use crate::landmarks::{FrameId, LandmarkId, PlaneId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkEstimate {
    pub id: LandmarkId,
    pub position: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneEstimate {
    pub id: PlaneId,
    pub plane: OrientedPlane,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateUpdate {
    pub keyframe: FrameId,
    pub timestamp_ns: Timestamp,
    /// Body pose in the world frame.
    pub pose: SE3,
    pub velocity: Vector3<f64>,
    pub bias: ImuBias,
    pub landmarks: Vec<LandmarkEstimate>,
    pub planes: Vec<PlaneEstimate>,
}

//! Per-keyframe inputs from the front end.

use serde::{Deserialize, Serialize};

use crate::geometry::SE3;
use crate::imu::{PreintegratedSummary, Timestamp};
use crate::landmarks::{LandmarkId, StereoObservation};
use crate::lifecycle::PlaneRegion;

/// Quality of the front end's tracking at a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingStatus {
    #[default]
    Valid,
    /// Too little parallax; the body is likely not moving.
    LowDisparity,
    Invalid,
}

/// Vision measurements at one keyframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionUpdate {
    pub observations: Vec<(LandmarkId, StereoObservation)>,
    pub status: TrackingStatus,
    /// Relative body pose since the previous keyframe from stereo RANSAC.
    pub stereo_relative_pose: Option<SE3>,
}

/// Everything the driver consumes for one estimation step.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeInput {
    pub timestamp_ns: Timestamp,
    /// Summary since the previous keyframe. When absent the shared
    /// accumulator is used.
    pub preintegrated: Option<PreintegratedSummary>,
    pub vision: VisionUpdate,
    pub planes: Vec<PlaneRegion>,
}

impl KeyframeInput {
    pub fn new(timestamp_ns: Timestamp, vision: VisionUpdate) -> Self {
        Self {
            timestamp_ns,
            preintegrated: None,
            vision,
            planes: Vec::new(),
        }
    }
}

use thiserror::Error;

use crate::landmarks::{LandmarkId, PlaneId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("landmark {landmark} is degenerate and was dropped: {reason}")]
    DegenerateLandmark { landmark: LandmarkId, reason: String },

    #[error("unknown landmark {0}")]
    UnknownLandmark(LandmarkId),

    #[error("landmark {0} is already tracked")]
    AlreadyTracked(LandmarkId),

    #[error("landmark {0} has no explicit point variable")]
    NotStructured(LandmarkId),

    #[error("unknown plane {0}")]
    UnknownPlane(PlaneId),
}

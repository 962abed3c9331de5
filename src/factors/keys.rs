//! Names of estimation variables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::landmarks::{FrameId, LandmarkId, PlaneId};

/// Key of one variable in the estimation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariableKey {
    Pose(FrameId),
    Velocity(FrameId),
    Bias(FrameId),
    Landmark(LandmarkId),
    Plane(PlaneId),
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::Pose(id) => write!(f, "x{}", id.0),
            VariableKey::Velocity(id) => write!(f, "v{}", id.0),
            VariableKey::Bias(id) => write!(f, "b{}", id.0),
            VariableKey::Landmark(id) => write!(f, "l{}", id.0),
            VariableKey::Plane(id) => write!(f, "p{}", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(VariableKey::Pose(FrameId(4)).to_string(), "x4");
        assert_eq!(VariableKey::Landmark(LandmarkId(17)).to_string(), "l17");
        assert_eq!(VariableKey::Plane(PlaneId(2)).to_string(), "p2");
    }
}

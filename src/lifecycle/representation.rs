//! Per-landmark factor representation.

use crate::factors::{FactorSlot, StructurelessFactor, Ticket};
use crate::landmarks::{FrameId, PlaneId};

/// Where a factor currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorLocation {
    /// Emitted into the pending set, not yet drained.
    Pending(Ticket),
    /// Drained and submitted; the slot arrives on absorb.
    InFlight(Ticket),
    /// Present in the engine under this slot.
    Live(FactorSlot),
}

impl FactorLocation {
    pub fn ticket(&self) -> Option<Ticket> {
        match *self {
            FactorLocation::Pending(t) | FactorLocation::InFlight(t) => Some(t),
            FactorLocation::Live(_) => None,
        }
    }
}

/// Public view of a landmark's representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Unstructured,
    Structured,
    StructuredWithRegularity(PlaneId),
}

/// The single record kept per landmark.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LandmarkRecord {
    Unstructured {
        factor: StructurelessFactor,
        location: FactorLocation,
        /// Observations were added after the factor left the pending set.
        needs_refresh: bool,
    },
    Structured {
        observations: Vec<(FrameId, FactorLocation)>,
    },
    StructuredWithRegularity {
        observations: Vec<(FrameId, FactorLocation)>,
        plane: PlaneId,
        regularity: FactorLocation,
    },
}

impl LandmarkRecord {
    pub fn representation(&self) -> Representation {
        match self {
            LandmarkRecord::Unstructured { .. } => Representation::Unstructured,
            LandmarkRecord::Structured { .. } => Representation::Structured,
            LandmarkRecord::StructuredWithRegularity { plane, .. } => {
                Representation::StructuredWithRegularity(*plane)
            }
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, LandmarkRecord::Unstructured { .. })
    }

    pub fn observations_mut(&mut self) -> Option<&mut Vec<(FrameId, FactorLocation)>> {
        match self {
            LandmarkRecord::Unstructured { .. } => None,
            LandmarkRecord::Structured { observations }
            | LandmarkRecord::StructuredWithRegularity { observations, .. } => Some(observations),
        }
    }

    pub fn locations(&self) -> Vec<FactorLocation> {
        match self {
            LandmarkRecord::Unstructured { location, .. } => vec![*location],
            LandmarkRecord::Structured { observations } => {
                observations.iter().map(|(_, loc)| *loc).collect()
            }
            LandmarkRecord::StructuredWithRegularity {
                observations,
                regularity,
                ..
            } => observations
                .iter()
                .map(|(_, loc)| *loc)
                .chain(std::iter::once(*regularity))
                .collect(),
        }
    }

    pub fn locations_mut(&mut self) -> Vec<&mut FactorLocation> {
        match self {
            LandmarkRecord::Unstructured { location, .. } => vec![location],
            LandmarkRecord::Structured { observations } => {
                observations.iter_mut().map(|(_, loc)| loc).collect()
            }
            LandmarkRecord::StructuredWithRegularity {
                observations,
                regularity,
                ..
            } => observations
                .iter_mut()
                .map(|(_, loc)| loc)
                .chain(std::iter::once(regularity))
                .collect(),
        }
    }
}

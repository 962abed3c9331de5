//! Planar regions reported by the plane detector.

use std::collections::BTreeSet;

use nalgebra::Vector3;

use crate::geometry::OrientedPlane;
use crate::landmarks::{LandmarkId, PlaneId};

/// A detected plane and the landmarks believed to lie on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneRegion {
    pub id: PlaneId,
    pub plane: OrientedPlane,
    pub members: BTreeSet<LandmarkId>,
}

impl PlaneRegion {
    /// `None` for a zero normal.
    pub fn new(
        id: PlaneId,
        normal: Vector3<f64>,
        distance: f64,
        members: impl IntoIterator<Item = LandmarkId>,
    ) -> Option<Self> {
        Some(Self {
            id,
            plane: OrientedPlane::new(normal, distance)?,
            members: members.into_iter().collect(),
        })
    }
}

/// What the lifecycle manager remembers about a region.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlaneState {
    pub region: PlaneRegion,
    /// Landmarks found off this plane; never re-attached to it.
    pub outliers: BTreeSet<LandmarkId>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub new_planes: usize,
    pub forgotten_planes: usize,
    pub attached: usize,
    pub detached: usize,
    pub outliers: usize,
}

//! Which landmarks get which factor types.

use serde::{Deserialize, Serialize};

use crate::factors::RobustKernel;

/// Factor families the backend may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendModality {
    /// Every landmark stays unstructured.
    Structureless,
    /// Every well-conditioned landmark gets an explicit point.
    Projection,
    /// Landmarks on a plane become structured; the rest stay unstructured.
    StructurelessAndProjection,
    /// Every well-conditioned landmark is structured; plane members are
    /// regularized.
    ProjectionAndRegularity,
    /// Plane members become structured and regularized; the rest stay
    /// unstructured.
    #[default]
    StructurelessProjectionAndRegularity,
}

impl BackendModality {
    /// Whether a landmark should get an explicit point variable.
    pub fn promotes(&self, on_plane: bool) -> bool {
        match self {
            BackendModality::Structureless => false,
            BackendModality::Projection | BackendModality::ProjectionAndRegularity => true,
            BackendModality::StructurelessAndProjection
            | BackendModality::StructurelessProjectionAndRegularity => on_plane,
        }
    }

    pub fn uses_regularity(&self) -> bool {
        matches!(
            self,
            BackendModality::ProjectionAndRegularity
                | BackendModality::StructurelessProjectionAndRegularity
        )
    }
}

/// Thresholds and noise settings for the landmark factor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    pub modality: BackendModality,
    /// Observations with a known pose required to triangulate a point.
    pub min_observations: usize,
    /// Minimum ray angle for triangulation (degrees).
    pub min_parallax_deg: f64,
    /// Mean reprojection error bound in normalized image units.
    pub max_triangulation_error: f64,
    /// Pixel noise of vision factors.
    pub pixel_sigma: f64,
    pub structureless_kernel: RobustKernel,
    pub projection_kernel: RobustKernel,
    /// Point-to-plane distance noise (m).
    pub regularity_sigma: f64,
    pub regularity_kernel: RobustKernel,
    /// Landmarks farther than this from their plane are detached (m).
    pub plane_tolerance: f64,
    /// Structured members a region needs to be kept.
    pub min_plane_support: usize,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            modality: BackendModality::default(),
            min_observations: 3,
            min_parallax_deg: 1.0,
            max_triangulation_error: 0.01,
            pixel_sigma: 1.0,
            structureless_kernel: RobustKernel::L2,
            projection_kernel: RobustKernel::Huber(1.345),
            regularity_sigma: 0.1,
            regularity_kernel: RobustKernel::Tukey(4.6851),
            plane_tolerance: 0.2,
            min_plane_support: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_decisions() {
        use BackendModality::*;
        assert!(!Structureless.promotes(true));
        assert!(Projection.promotes(false));
        assert!(!StructurelessAndProjection.promotes(false));
        assert!(StructurelessAndProjection.promotes(true));
        assert!(!StructurelessAndProjection.uses_regularity());
        assert!(StructurelessProjectionAndRegularity.uses_regularity());
        assert_eq!(BackendModality::default(), StructurelessProjectionAndRegularity);
    }

    #[test]
    fn test_policy_fills_missing_fields_from_defaults() {
        let policy: LifecyclePolicy =
            serde_json::from_str(r#"{"modality":"Projection","min_observations":2}"#).unwrap();
        assert_eq!(policy.modality, BackendModality::Projection);
        assert_eq!(policy.min_observations, 2);
        assert_eq!(policy.min_plane_support, 1);
        assert_eq!(policy.projection_kernel, RobustKernel::Huber(1.345));
    }
}

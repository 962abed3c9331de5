//! Geometry utilities: SE3 transforms, SO(3) helpers, stereo camera model,
//! planes and multi-view triangulation.

pub mod camera;
pub mod plane;
pub mod se3;
pub mod so3;
pub mod triangulation;

pub use camera::StereoCamera;
pub use plane::OrientedPlane;
pub use se3::SE3;
pub use triangulation::{
    triangulate_views, Triangulated, TriangulationFailure, TriangulationThresholds,
};

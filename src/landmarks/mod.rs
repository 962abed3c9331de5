//! Landmark identities and their observation histories.

pub mod table;
pub mod track;
pub mod types;

pub use table::LandmarkTrackTable;
pub use track::{FeatureTrack, TrackError};
pub use types::{FrameId, LandmarkId, PlaneId, StereoObservation};

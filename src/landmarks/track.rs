//! Observation history of a single landmark.

use thiserror::Error;

use super::types::{FrameId, LandmarkId, StereoObservation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    #[error("landmark {landmark} already observed in frame {frame}")]
    DuplicateObservation { landmark: LandmarkId, frame: FrameId },

    #[error("unknown landmark {0}")]
    UnknownLandmark(LandmarkId),
}

/// Observations of one landmark, ordered by frame, at most one per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTrack {
    observations: Vec<(FrameId, StereoObservation)>,
}

impl FeatureTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping frame order. Returns `false` (and leaves the track
    /// unchanged) if the frame is already present.
    pub fn insert(&mut self, frame: FrameId, observation: StereoObservation) -> bool {
        match self.observations.binary_search_by_key(&frame, |(f, _)| *f) {
            Ok(_) => false,
            Err(pos) => {
                self.observations.insert(pos, (frame, observation));
                true
            }
        }
    }

    pub fn get(&self, frame: FrameId) -> Option<&StereoObservation> {
        self.observations
            .binary_search_by_key(&frame, |(f, _)| *f)
            .ok()
            .map(|i| &self.observations[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FrameId, StereoObservation)> + Clone + '_ {
        self.observations.iter()
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.observations.iter().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_frame(&self) -> Option<FrameId> {
        self.observations.first().map(|(f, _)| *f)
    }

    pub fn last_frame(&self) -> Option<FrameId> {
        self.observations.last().map(|(f, _)| *f)
    }

    /// Number of observations with valid stereo at or after `frame`.
    pub fn stereo_count_since(&self, frame: FrameId) -> usize {
        let start = self.observations.partition_point(|(f, _)| *f < frame);
        self.observations[start..]
            .iter()
            .filter(|(_, obs)| obs.has_valid_stereo())
            .count()
    }
}

//! Per-landmark observation histories.
//!
//! The table is keyed by landmark and each track by frame, so observations
//! come back in keyframe order. A track is erased as a whole, either when the
//! landmark is pruned or when its promotion turns out degenerate. A later
//! observation of the same landmark starts a fresh track.

use std::collections::BTreeMap;

use super::track::{FeatureTrack, TrackError};
use super::types::{FrameId, LandmarkId, StereoObservation};

/// All feature tracks known to the backend, keyed by landmark.
///
/// There is no implicit eviction: a track lives until [`erase`](Self::erase)
/// is called, so memory grows with the number of distinct landmarks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkTrackTable {
    tracks: BTreeMap<LandmarkId, FeatureTrack>,
}

impl LandmarkTrackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, creating the track on first sight.
    pub fn add_observation(
        &mut self,
        landmark: LandmarkId,
        frame: FrameId,
        observation: StereoObservation,
    ) -> Result<(), TrackError> {
        let track = self.tracks.entry(landmark).or_default();
        if track.insert(frame, observation) {
            Ok(())
        } else {
            Err(TrackError::DuplicateObservation { landmark, frame })
        }
    }

    /// Landmark ids in ascending order. The iterator borrows the table, so
    /// it sees one consistent state and can be cloned to restart.
    pub fn landmark_ids(&self) -> impl Iterator<Item = LandmarkId> + Clone + '_ {
        self.tracks.keys().copied()
    }

    pub fn track(&self, landmark: LandmarkId) -> Option<&FeatureTrack> {
        self.tracks.get(&landmark)
    }

    pub fn erase(&mut self, landmark: LandmarkId) -> Result<FeatureTrack, TrackError> {
        self.tracks
            .remove(&landmark)
            .ok_or(TrackError::UnknownLandmark(landmark))
    }

    pub fn contains(&self, landmark: LandmarkId) -> bool {
        self.tracks.contains_key(&landmark)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn total_observations(&self) -> usize {
        self.tracks.values().map(FeatureTrack::len).sum()
    }

    pub fn stereo_observations_since(
        &self,
        landmark: LandmarkId,
        frame: FrameId,
    ) -> Result<usize, TrackError> {
        self.track(landmark)
            .map(|t| t.stereo_count_since(frame))
            .ok_or(TrackError::UnknownLandmark(landmark))
    }

    pub fn last_seen(&self, landmark: LandmarkId) -> Option<FrameId> {
        self.track(landmark).and_then(FeatureTrack::last_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(u: f64) -> StereoObservation {
        StereoObservation::stereo(u, 100.0, u - 10.0)
    }

    #[test]
    fn test_duplicate_observation_rejected() {
        let mut table = LandmarkTrackTable::new();
        table.add_observation(LandmarkId(1), FrameId(1), obs(10.0)).unwrap();
        let before = table.clone();

        assert_eq!(
            table.add_observation(LandmarkId(1), FrameId(1), obs(20.0)),
            Err(TrackError::DuplicateObservation {
                landmark: LandmarkId(1),
                frame: FrameId(1)
            })
        );
        assert_eq!(table, before);
    }

    #[test]
    fn test_landmark_ids_restartable() {
        let mut table = LandmarkTrackTable::new();
        for id in [5, 1, 3] {
            table.add_observation(LandmarkId(id), FrameId(0), obs(1.0)).unwrap();
        }
        let ids = table.landmark_ids();
        let first: Vec<_> = ids.clone().collect();
        let second: Vec<_> = ids.collect();
        assert_eq!(first, vec![LandmarkId(1), LandmarkId(3), LandmarkId(5)]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_erase() {
        let mut table = LandmarkTrackTable::new();
        table.add_observation(LandmarkId(1), FrameId(0), obs(1.0)).unwrap();
        assert_eq!(table.erase(LandmarkId(1)).map(|t| t.len()), Ok(1));
        assert!(table.is_empty());
        assert_eq!(
            table.erase(LandmarkId(1)),
            Err(TrackError::UnknownLandmark(LandmarkId(1)))
        );
    }

    #[test]
    fn test_last_seen_and_stereo_counts() {
        let mut table = LandmarkTrackTable::new();
        table.add_observation(LandmarkId(2), FrameId(4), obs(30.0)).unwrap();
        table
            .add_observation(LandmarkId(2), FrameId(6), StereoObservation::mono(30.0, 1.0))
            .unwrap();
        assert_eq!(table.last_seen(LandmarkId(2)), Some(FrameId(6)));
        assert_eq!(table.stereo_observations_since(LandmarkId(2), FrameId(5)), Ok(0));
        assert_eq!(table.stereo_observations_since(LandmarkId(2), FrameId(0)), Ok(1));
    }

    #[test]
    fn test_growth_is_unbounded_without_erase() {
        let mut table = LandmarkTrackTable::new();
        for frame in 0..200u64 {
            for l in 0..50u64 {
                table
                    .add_observation(LandmarkId(frame * 50 + l), FrameId(frame), obs(40.0))
                    .unwrap();
            }
        }
        assert_eq!(table.len(), 10_000);
        assert_eq!(table.total_observations(), 10_000);
    }
}

//! Landmark factor lifecycle.
//!
//! Every landmark moves through
//!
//! ```text
//! Absent -> Unstructured -> Structured <-> StructuredWithRegularity
//! ```
//!
//! and never goes back to `Unstructured`. The manager stages factor
//! insertions, in-place rewrites and deletions until the driver drains them,
//! then binds the engine's slots to the drained factors.
//!
//! # Representations
//!
//! - **Unstructured**: one structureless factor over every observing pose,
//!   created at the second observation and rewritten at the same slot as
//!   observations arrive.
//! - **Structured**: an explicit point variable seeded by multi-view
//!   triangulation, with one projection factor per observation.
//! - **StructuredWithRegularity**: as above, plus one point-to-plane factor
//!   binding the point to a detected plane.
//!
//! # Factor locations
//!
//! A factor is either *pending* (staged, no slot yet), *in flight* (drained,
//! waiting for its slot) or *live* (bound to an engine slot). Retiring a
//! pending factor just drops it; retiring a live one queues its slot for
//! deletion. Retiring an in-flight factor is deferred until
//! [`FactorLifecycleManager::absorb_slots`] binds its slot, and the slot is
//! deleted on the next drain.
//!
//! # Plane reconciliation
//!
//! Each keyframe, [`FactorLifecycleManager::reconcile_plane_regions`]:
//!
//! 1. Forgets known planes that are missing or under-supported, detaching
//!    their landmarks
//! 2. Inserts newly supported planes with their detector estimate
//! 3. Detaches landmarks no longer listed by their region, or whose latest
//!    estimate has drifted off the plane (those become outliers of that
//!    plane and are not attached again)
//! 4. Attaches structured members, taking regions in the order given

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::error::LifecycleError;
use super::pending::{PendingChanges, PendingSet, Settled};
use super::plane::{PlaneRegion, PlaneState, ReconcileReport};
use super::policy::LifecyclePolicy;
use super::representation::{FactorLocation, LandmarkRecord, Representation};
use crate::factors::{
    Factor, FactorSlot, NoiseModel, PointPlaneFactor, ProjectionFactor, StructurelessFactor,
    Ticket, Value, Values, VariableKey,
};
use crate::geometry::{triangulate_views, StereoCamera, TriangulationThresholds};
use crate::landmarks::{FeatureTrack, FrameId, LandmarkId, PlaneId, StereoObservation};

#[derive(Debug, Clone, PartialEq)]
pub struct FactorLifecycleManager {
    policy: LifecyclePolicy,
    camera: StereoCamera,
    records: BTreeMap<LandmarkId, LandmarkRecord>,
    planes: BTreeMap<PlaneId, PlaneState>,
    pending: PendingSet,
    ticket_owner: BTreeMap<Ticket, LandmarkId>,
    next_ticket: u64,
    /// Latest landmark and plane estimates.
    latest: Values,
}

impl FactorLifecycleManager {
    pub fn new(policy: LifecyclePolicy, camera: StereoCamera) -> Self {
        Self {
            policy,
            camera,
            records: BTreeMap::new(),
            planes: BTreeMap::new(),
            pending: PendingSet::default(),
            ticket_owner: BTreeMap::new(),
            next_ticket: 0,
            latest: Values::new(),
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Start tracking a landmark with an unstructured factor over every
    /// observation so far.
    pub fn add_landmark(
        &mut self,
        landmark: LandmarkId,
        track: &FeatureTrack,
    ) -> Result<(), LifecycleError> {
        if self.records.contains_key(&landmark) {
            return Err(LifecycleError::AlreadyTracked(landmark));
        }
        let factor = StructurelessFactor {
            landmark,
            observations: track.iter().copied().collect(),
            camera: self.camera,
            pixel_sigma: self.policy.pixel_sigma,
            kernel: self.policy.structureless_kernel,
        };
        let ticket = self.issue_ticket(landmark);
        self.pending
            .insert_factor(ticket, Factor::Structureless(factor.clone()));
        self.records.insert(
            landmark,
            LandmarkRecord::Unstructured {
                factor,
                location: FactorLocation::Pending(ticket),
                needs_refresh: false,
            },
        );
        debug!("Added {} with {} observations", landmark, track.len());
        Ok(())
    }

    /// Extend a tracked landmark with a new observation.
    ///
    /// An unstructured factor is edited in place; once it is in the engine
    /// it is rewritten at its existing slot on the next drain. A structured
    /// landmark gains one projection factor.
    pub fn add_observation(
        &mut self,
        landmark: LandmarkId,
        frame: FrameId,
        observation: StereoObservation,
    ) -> Result<(), LifecycleError> {
        let structured = self
            .records
            .get(&landmark)
            .ok_or(LifecycleError::UnknownLandmark(landmark))?
            .is_structured();

        if !structured {
            if let Some(LandmarkRecord::Unstructured {
                factor,
                location,
                needs_refresh,
            }) = self.records.get_mut(&landmark)
            {
                factor.push(frame, observation);
                match *location {
                    FactorLocation::Pending(t) => {
                        self.pending
                            .edit_factor(t, Factor::Structureless(factor.clone()));
                    }
                    FactorLocation::InFlight(_) | FactorLocation::Live(_) => *needs_refresh = true,
                }
            }
            return Ok(());
        }

        let factor = self.projection_factor(landmark, frame, observation);
        let ticket = self.issue_ticket(landmark);
        self.pending.insert_factor(ticket, factor);

        let mut replaced = None;
        if let Some(observations) = self
            .records
            .get_mut(&landmark)
            .and_then(LandmarkRecord::observations_mut)
        {
            match observations.binary_search_by_key(&frame, |(f, _)| *f) {
                Ok(i) => {
                    replaced = Some(observations[i].1);
                    observations[i].1 = FactorLocation::Pending(ticket);
                }
                Err(i) => observations.insert(i, (frame, FactorLocation::Pending(ticket))),
            }
        }
        if let Some(old) = replaced {
            self.retire(old);
        }
        Ok(())
    }

    /// Give a landmark an explicit point variable.
    ///
    /// Observations whose frame has a pose in `poses` are usable; with fewer
    /// than `min_observations` of them, or if triangulation is
    /// ill-conditioned, the landmark is dropped and `DegenerateLandmark` is
    /// returned. On success the point value, one projection factor per usable
    /// observation, and the deletion of the unstructured factor are staged
    /// together.
    pub fn promote_to_structured(
        &mut self,
        landmark: LandmarkId,
        track: &FeatureTrack,
        poses: &Values,
    ) -> Result<(), LifecycleError> {
        let old_location = match self.records.get(&landmark) {
            None => return Err(LifecycleError::UnknownLandmark(landmark)),
            Some(LandmarkRecord::Unstructured { location, .. }) => *location,
            Some(_) => return Ok(()),
        };

        let usable: Vec<_> = track
            .iter()
            .filter_map(|(frame, obs)| poses.pose(*frame).map(|pose| (*frame, *obs, pose)))
            .collect();
        if usable.len() < self.policy.min_observations {
            let reason = format!(
                "{} usable observations, {} required",
                usable.len(),
                self.policy.min_observations
            );
            return Err(self.drop_degenerate(landmark, reason));
        }

        let views: Vec<_> = usable
            .iter()
            .map(|(_, obs, pose)| (self.camera.camera_pose(pose), self.camera.normalized(&obs.left)))
            .collect();
        let thresholds = TriangulationThresholds {
            min_parallax: self.policy.min_parallax_deg.to_radians(),
            max_mean_error: self.policy.max_triangulation_error,
        };
        let point = match triangulate_views(&views, &thresholds) {
            Ok(t) => t.point,
            Err(failure) => return Err(self.drop_degenerate(landmark, format!("{:?}", failure))),
        };

        self.retire(old_location);
        let mut observations = Vec::with_capacity(usable.len());
        for (frame, obs, _) in &usable {
            let factor = self.projection_factor(landmark, *frame, *obs);
            let ticket = self.issue_ticket(landmark);
            self.pending.insert_factor(ticket, factor);
            observations.push((*frame, FactorLocation::Pending(ticket)));
        }
        let key = VariableKey::Landmark(landmark);
        self.pending.values_mut().insert(key, Value::Point(point));
        self.latest.insert(key, Value::Point(point));
        self.records
            .insert(landmark, LandmarkRecord::Structured { observations });

        debug!(
            "Promoted {} to structured with {} projection factors",
            landmark,
            usable.len()
        );
        Ok(())
    }

    /// Constrain a structured landmark to lie on `plane`.
    pub fn attach_regularity(
        &mut self,
        landmark: LandmarkId,
        plane: PlaneId,
    ) -> Result<(), LifecycleError> {
        if !self.planes.contains_key(&plane) {
            return Err(LifecycleError::UnknownPlane(plane));
        }
        match self.records.get(&landmark) {
            None => return Err(LifecycleError::UnknownLandmark(landmark)),
            Some(LandmarkRecord::Unstructured { .. }) => {
                return Err(LifecycleError::NotStructured(landmark))
            }
            Some(LandmarkRecord::StructuredWithRegularity { plane: current, .. }) => {
                if *current == plane {
                    return Ok(());
                }
                self.detach_regularity(landmark)?;
            }
            Some(LandmarkRecord::Structured { .. }) => {}
        }

        let factor = Factor::PointPlane(PointPlaneFactor {
            landmark,
            plane,
            noise: NoiseModel::isotropic(1, self.policy.regularity_sigma)
                .robust(self.policy.regularity_kernel),
        });
        let ticket = self.issue_ticket(landmark);
        self.pending.insert_factor(ticket, factor);

        if let Some(LandmarkRecord::Structured { observations }) = self.records.remove(&landmark) {
            self.records.insert(
                landmark,
                LandmarkRecord::StructuredWithRegularity {
                    observations,
                    plane,
                    regularity: FactorLocation::Pending(ticket),
                },
            );
        }
        Ok(())
    }

    /// Remove the point-plane factor, leaving the projection factors alone.
    pub fn detach_regularity(&mut self, landmark: LandmarkId) -> Result<(), LifecycleError> {
        match self.records.remove(&landmark) {
            None => Err(LifecycleError::UnknownLandmark(landmark)),
            Some(LandmarkRecord::StructuredWithRegularity {
                observations,
                regularity,
                ..
            }) => {
                self.retire(regularity);
                self.records
                    .insert(landmark, LandmarkRecord::Structured { observations });
                Ok(())
            }
            Some(record) => {
                let structured = record.is_structured();
                self.records.insert(landmark, record);
                if structured {
                    Ok(())
                } else {
                    Err(LifecycleError::NotStructured(landmark))
                }
            }
        }
    }

    /// Bring plane memberships in line with the detector's current regions.
    ///
    /// Regions with fewer than `min_plane_support` structured members are
    /// unsupported; known planes missing from `regions` or unsupported are
    /// forgotten and their regularity factors removed.
    pub fn reconcile_plane_regions(&mut self, regions: &[PlaneRegion]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !self.policy.modality.uses_regularity() {
            return report;
        }

        let supported: BTreeMap<PlaneId, &PlaneRegion> = regions
            .iter()
            .filter(|r| self.support(r) >= self.policy.min_plane_support)
            .map(|r| (r.id, r))
            .collect();

        let forgotten: Vec<PlaneId> = self
            .planes
            .keys()
            .filter(|id| !supported.contains_key(id))
            .copied()
            .collect();
        for id in forgotten {
            for landmark in self.attached_to(Some(id)) {
                self.detach_quietly(landmark);
                report.detached += 1;
            }
            self.planes.remove(&id);
            self.latest.remove(&VariableKey::Plane(id));
            report.forgotten_planes += 1;
            debug!("Forgot unsupported plane {}", id);
        }

        for (id, region) in &supported {
            match self.planes.get_mut(id) {
                Some(state) => state.region = (*region).clone(),
                None => {
                    let key = VariableKey::Plane(*id);
                    self.pending.values_mut().insert(key, Value::Plane(region.plane));
                    self.latest.insert(key, Value::Plane(region.plane));
                    self.planes.insert(
                        *id,
                        PlaneState {
                            region: (*region).clone(),
                            outliers: BTreeSet::new(),
                        },
                    );
                    report.new_planes += 1;
                }
            }
        }

        for landmark in self.attached_to(None) {
            let Some(LandmarkRecord::StructuredWithRegularity { plane, .. }) =
                self.records.get(&landmark)
            else {
                continue;
            };
            let plane = *plane;
            let Some(state) = self.planes.get(&plane) else {
                continue;
            };
            if !state.region.members.contains(&landmark) {
                self.detach_quietly(landmark);
                report.detached += 1;
                continue;
            }
            let estimate = self.latest.plane(plane).unwrap_or(state.region.plane);
            let off_plane = self
                .latest
                .point(landmark)
                .map_or(false, |p| estimate.signed_distance(&p).abs() > self.policy.plane_tolerance);
            if off_plane {
                self.detach_quietly(landmark);
                if let Some(state) = self.planes.get_mut(&plane) {
                    state.outliers.insert(landmark);
                }
                report.outliers += 1;
                debug!("Detached {} from {}: off plane", landmark, plane);
            }
        }

        // A landmark listed by several regions goes to the first one in
        // `regions`.
        let mut to_attach = Vec::new();
        for region in regions {
            let Some(state) = self.planes.get(&region.id) else {
                continue;
            };
            for landmark in &state.region.members {
                if state.outliers.contains(landmark) {
                    continue;
                }
                if let Some(LandmarkRecord::Structured { .. }) = self.records.get(landmark) {
                    to_attach.push((*landmark, region.id));
                }
            }
        }
        for (landmark, plane) in to_attach {
            if let Some(LandmarkRecord::Structured { .. }) = self.records.get(&landmark) {
                if self.attach_regularity(landmark, plane).is_ok() {
                    report.attached += 1;
                }
            }
        }

        if report != ReconcileReport::default() {
            debug!("Plane reconciliation: {:?}", report);
        }
        report
    }

    /// Drain everything staged since the last call. A second call without
    /// intervening mutation returns an empty set.
    pub fn pending_factors_and_deletions(&mut self) -> PendingChanges {
        let mut replacements = Vec::new();
        for record in self.records.values_mut() {
            if let LandmarkRecord::Unstructured {
                factor,
                location: FactorLocation::Live(slot),
                needs_refresh,
            } = record
            {
                if *needs_refresh {
                    replacements.push((*slot, Factor::Structureless(factor.clone())));
                    *needs_refresh = false;
                }
            }
        }

        let (new_values, new_factors, deletions) = self.pending.drain();
        for (ticket, _) in &new_factors {
            let Some(owner) = self.ticket_owner.get(ticket) else {
                continue;
            };
            if let Some(record) = self.records.get_mut(owner) {
                for location in record.locations_mut() {
                    if *location == FactorLocation::Pending(*ticket) {
                        *location = FactorLocation::InFlight(*ticket);
                    }
                }
            }
        }

        PendingChanges {
            new_values,
            new_factors,
            replacements,
            deletions,
        }
    }

    /// Bind engine-assigned slots to drained tickets. Factors whose removal
    /// was requested while in flight are queued for deletion in the next
    /// drain. Returns the number of slots bound to live factors.
    pub fn absorb_slots(&mut self, assignments: &[(Ticket, FactorSlot)]) -> usize {
        let mut bound = 0;
        for &(ticket, slot) in assignments {
            let owner = self.ticket_owner.remove(&ticket);
            match self.pending.settle(ticket, slot) {
                Settled::Bound => {
                    if let Some(record) = owner.and_then(|o| self.records.get_mut(&o)) {
                        for location in record.locations_mut() {
                            if *location == FactorLocation::InFlight(ticket) {
                                *location = FactorLocation::Live(slot);
                                bound += 1;
                            }
                        }
                    }
                }
                Settled::Deferred => debug!("Deferred deletion of {} to next step", ticket),
                Settled::Unknown => warn!("Slot reported for unknown ticket {}", ticket),
            }
        }
        bound
    }

    /// Keep the latest estimates of tracked landmarks and known planes.
    pub fn absorb_estimate(&mut self, values: &Values) {
        for (landmark, point) in values.landmarks() {
            if self.records.contains_key(&landmark) {
                self.latest
                    .insert(VariableKey::Landmark(landmark), Value::Point(point));
            }
        }
        for (id, plane) in values.planes() {
            if self.planes.contains_key(&id) {
                self.latest.insert(VariableKey::Plane(id), Value::Plane(plane));
            }
        }
    }

    /// Forget a landmark and queue removal of all its factors.
    pub fn remove_landmark(&mut self, landmark: LandmarkId) -> Result<(), LifecycleError> {
        let record = self
            .records
            .remove(&landmark)
            .ok_or(LifecycleError::UnknownLandmark(landmark))?;
        for location in record.locations() {
            self.retire(location);
        }
        let key = VariableKey::Landmark(landmark);
        self.pending.values_mut().remove(&key);
        self.latest.remove(&key);
        Ok(())
    }

    pub fn representation(&self, landmark: LandmarkId) -> Option<Representation> {
        self.records.get(&landmark).map(LandmarkRecord::representation)
    }

    pub fn contains(&self, landmark: LandmarkId) -> bool {
        self.records.contains_key(&landmark)
    }

    pub fn landmark_count(&self) -> usize {
        self.records.len()
    }

    pub fn structured_landmarks(&self) -> impl Iterator<Item = LandmarkId> + '_ {
        self.records
            .iter()
            .filter(|(_, r)| r.is_structured())
            .map(|(id, _)| *id)
    }

    pub fn unstructured_landmarks(&self) -> impl Iterator<Item = LandmarkId> + '_ {
        self.records
            .iter()
            .filter(|(_, r)| !r.is_structured())
            .map(|(id, _)| *id)
    }

    pub fn plane(&self, id: PlaneId) -> Option<&PlaneRegion> {
        self.planes.get(&id).map(|s| &s.region)
    }

    pub fn plane_ids(&self) -> impl Iterator<Item = PlaneId> + '_ {
        self.planes.keys().copied()
    }

    pub fn is_plane_outlier(&self, landmark: LandmarkId, plane: PlaneId) -> bool {
        self.planes
            .get(&plane)
            .map_or(false, |s| s.outliers.contains(&landmark))
    }

    pub fn latest_estimates(&self) -> &Values {
        &self.latest
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
            || self.records.values().any(|r| {
                matches!(
                    r,
                    LandmarkRecord::Unstructured {
                        location: FactorLocation::Live(_),
                        needs_refresh: true,
                        ..
                    }
                )
            })
    }

    pub fn in_flight_count(&self) -> usize {
        self.pending.in_flight_len()
    }

    fn issue_ticket(&mut self, owner: LandmarkId) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.ticket_owner.insert(ticket, owner);
        ticket
    }

    fn retire(&mut self, location: FactorLocation) {
        if let FactorLocation::Pending(t) = location {
            self.ticket_owner.remove(&t);
        }
        self.pending.retire(location);
    }

    fn projection_factor(
        &self,
        landmark: LandmarkId,
        frame: FrameId,
        observation: StereoObservation,
    ) -> Factor {
        Factor::Projection(ProjectionFactor {
            frame,
            landmark,
            observation,
            camera: self.camera,
            pixel_sigma: self.policy.pixel_sigma,
            kernel: self.policy.projection_kernel,
        })
    }

    fn drop_degenerate(&mut self, landmark: LandmarkId, reason: String) -> LifecycleError {
        if let Some(record) = self.records.remove(&landmark) {
            for location in record.locations() {
                self.retire(location);
            }
        }
        debug!("Dropped degenerate {}: {}", landmark, reason);
        LifecycleError::DegenerateLandmark { landmark, reason }
    }

    fn detach_quietly(&mut self, landmark: LandmarkId) {
        if let Err(e) = self.detach_regularity(landmark) {
            warn!("Failed to detach {}: {}", landmark, e);
        }
    }

    /// Landmarks with a regularity factor, optionally on one plane only.
    fn attached_to(&self, plane: Option<PlaneId>) -> Vec<LandmarkId> {
        self.records
            .iter()
            .filter_map(|(id, r)| match r {
                LandmarkRecord::StructuredWithRegularity { plane: p, .. }
                    if plane.map_or(true, |want| want == *p) =>
                {
                    Some(*id)
                }
                _ => None,
            })
            .collect()
    }

    fn support(&self, region: &PlaneRegion) -> usize {
        let outliers = self.planes.get(&region.id).map(|s| &s.outliers);
        region
            .members
            .iter()
            .filter(|l| outliers.map_or(true, |o| !o.contains(*l)))
            .filter(|l| self.records.get(*l).map_or(false, LandmarkRecord::is_structured))
            .count()
    }
}

//! In-memory factor ledger implementing [`OptimizationEngine`].
//!
//! It keeps the live factor set and the variable values, validates every
//! slot and variable reference, and echoes values back unchanged. Useful
//! wherever the bookkeeping matters more than the solve.
//!
//! # Update contract
//!
//! An update is all-or-nothing. It is rejected, leaving the ledger as it
//! was, when
//!
//! - a deletion or replacement names a slot that is not live, or names it
//!   twice
//! - a factor references a variable that is neither known nor supplied
//!
//! Otherwise deletions are applied first, then in-place replacements, then
//! new factors are inserted and their slots returned in submission order.

use slotmap::SlotMap;
use tracing::debug;

use super::engine::{EngineError, EngineOutput, OptimizationEngine, Submission};
use crate::factors::{Factor, FactorKind, FactorSlot, Values};

#[derive(Debug, Default)]
pub struct GraphLedger {
    factors: SlotMap<FactorSlot, Factor>,
    values: Values,
    fail_next: Option<EngineError>,
    updates: usize,
}

impl GraphLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next update fail with `error` without touching the ledger.
    pub fn fail_next(&mut self, error: EngineError) {
        self.fail_next = Some(error);
    }

    pub fn factor(&self, slot: FactorSlot) -> Option<&Factor> {
        self.factors.get(slot)
    }

    pub fn contains(&self, slot: FactorSlot) -> bool {
        self.factors.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Live factors in slot order.
    pub fn factors(&self) -> impl Iterator<Item = &Factor> + '_ {
        self.factors.values()
    }

    pub fn count(&self, kind: FactorKind) -> usize {
        self.factors.values().filter(|f| f.kind() == kind).count()
    }

    /// Sum of the losses of every factor that can be evaluated.
    pub fn total_loss(&self) -> f64 {
        self.factors
            .values()
            .filter_map(|f| f.loss(&self.values))
            .sum()
    }

    fn validate(&self, submission: &Submission, values: &Values) -> Result<(), EngineError> {
        let mut seen = Vec::with_capacity(submission.deletions.len());
        for &slot in &submission.deletions {
            if !self.factors.contains_key(slot) || seen.contains(&slot) {
                return Err(EngineError::StaleSlotHandle(slot));
            }
            seen.push(slot);
        }
        for (slot, factor) in &submission.replacements {
            if !self.factors.contains_key(*slot) || seen.contains(slot) {
                return Err(EngineError::StaleSlotHandle(*slot));
            }
            check_keys(factor, values)?;
        }
        for factor in &submission.new_factors {
            check_keys(factor, values)?;
        }
        Ok(())
    }
}

fn check_keys(factor: &Factor, values: &Values) -> Result<(), EngineError> {
    match factor.keys().into_iter().find(|k| !values.contains(k)) {
        Some(key) => Err(EngineError::UnknownVariable(key)),
        None => Ok(()),
    }
}

impl OptimizationEngine for GraphLedger {
    fn update(&mut self, submission: &Submission) -> Result<EngineOutput, EngineError> {
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }

        let mut values = self.values.clone();
        values.update_from(&submission.new_values);
        self.validate(submission, &values)?;

        for &slot in &submission.deletions {
            self.factors.remove(slot);
        }
        for (slot, factor) in &submission.replacements {
            if let Some(existing) = self.factors.get_mut(*slot) {
                *existing = factor.clone();
            }
        }
        let slots: Vec<_> = submission
            .new_factors
            .iter()
            .map(|f| self.factors.insert(f.clone()))
            .collect();
        self.values = values;
        self.updates += 1;

        debug!(
            "Ledger update {}: +{} factors, ~{} replaced, -{} deleted, {} live",
            self.updates,
            slots.len(),
            submission.replacements.len(),
            submission.deletions.len(),
            self.factors.len()
        );

        Ok(EngineOutput {
            values: self.values.clone(),
            slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{NoiseModel, Value, VariableKey};
    use crate::geometry::SE3;
    use crate::landmarks::FrameId;
    use nalgebra::Vector3;

    fn prior(frame: u64) -> Factor {
        Factor::PosePrior {
            frame: FrameId(frame),
            pose: SE3::identity(),
            noise: NoiseModel::isotropic(6, 0.1),
        }
    }

    fn with_pose(frame: u64) -> Values {
        let mut values = Values::new();
        values.insert(VariableKey::Pose(FrameId(frame)), Value::Pose(SE3::identity()));
        values
    }

    #[test]
    fn test_slots_in_submission_order() {
        let mut ledger = GraphLedger::new();
        let mut values = with_pose(0);
        values.update_from(&with_pose(1));
        let out = ledger
            .update(&Submission {
                new_values: values,
                new_factors: vec![prior(0), prior(1)],
                ..Submission::default()
            })
            .unwrap();
        assert_eq!(out.slots.len(), 2);
        assert!(matches!(ledger.factor(out.slots[1]), Some(Factor::PosePrior { frame, .. }) if *frame == FrameId(1)));
        assert_eq!(out.values.len(), 2);
    }

    #[test]
    fn test_stale_slot_rejected_atomically() {
        let mut ledger = GraphLedger::new();
        let out = ledger
            .update(&Submission {
                new_values: with_pose(0),
                new_factors: vec![prior(0)],
                ..Submission::default()
            })
            .unwrap();
        let slot = out.slots[0];
        ledger
            .update(&Submission {
                deletions: vec![slot],
                ..Submission::default()
            })
            .unwrap();
        assert!(ledger.is_empty());

        let err = ledger
            .update(&Submission {
                new_factors: vec![prior(0)],
                deletions: vec![slot],
                ..Submission::default()
            })
            .unwrap_err();
        assert_eq!(err, EngineError::StaleSlotHandle(slot));
        assert!(ledger.is_empty());

        let err = ledger
            .update(&Submission {
                replacements: vec![(slot, prior(0))],
                ..Submission::default()
            })
            .unwrap_err();
        assert_eq!(err, EngineError::StaleSlotHandle(slot));
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let mut ledger = GraphLedger::new();
        let err = ledger
            .update(&Submission {
                new_factors: vec![prior(3)],
                ..Submission::default()
            })
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownVariable(VariableKey::Pose(FrameId(3))));
        assert!(ledger.values().is_empty());
    }

    #[test]
    fn test_injected_failure_leaves_ledger_untouched() {
        let mut ledger = GraphLedger::new();
        ledger.fail_next(EngineError::Singular);
        let sub = Submission {
            new_values: with_pose(0),
            new_factors: vec![prior(0)],
            ..Submission::default()
        };
        assert_eq!(ledger.update(&sub), Err(EngineError::Singular));
        assert!(ledger.is_empty());
        assert_eq!(ledger.updates(), 0);

        ledger.update(&sub).unwrap();
        assert_eq!(ledger.count(FactorKind::PosePrior), 1);
        assert!(ledger.total_loss().abs() < 1e-12);
    }

    #[test]
    fn test_replacement_keeps_slot() {
        let mut ledger = GraphLedger::new();
        let mut values = with_pose(0);
        values.insert(VariableKey::Velocity(FrameId(0)), Value::Velocity(Vector3::zeros()));
        let slot = ledger
            .update(&Submission {
                new_values: values,
                new_factors: vec![prior(0)],
                ..Submission::default()
            })
            .unwrap()
            .slots[0];

        let zero_velocity = Factor::ZeroVelocity {
            frame: FrameId(0),
            noise: NoiseModel::isotropic(3, 0.01),
        };
        ledger
            .update(&Submission {
                replacements: vec![(slot, zero_velocity.clone())],
                ..Submission::default()
            })
            .unwrap();
        assert_eq!(ledger.factor(slot), Some(&zero_velocity));
        assert_eq!(ledger.len(), 1);
    }
}

//! Changes staged for the next engine submission.

use std::collections::{BTreeMap, BTreeSet};

use super::representation::FactorLocation;
use crate::factors::{Factor, FactorSlot, Ticket, Values};

/// Everything the engine must apply for the lifecycle's landmarks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    pub new_values: Values,
    /// New factors in ticket order; the engine assigns slots in this order.
    pub new_factors: Vec<(Ticket, Factor)>,
    /// Factors rewritten in place at an existing slot.
    pub replacements: Vec<(FactorSlot, Factor)>,
    pub deletions: Vec<FactorSlot>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.new_values.is_empty()
            && self.new_factors.is_empty()
            && self.replacements.is_empty()
            && self.deletions.is_empty()
    }
}

/// Outcome of binding a slot to an in-flight ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// The owner still wants the factor.
    Bound,
    /// Removal was requested while in flight; the slot is queued for deletion.
    Deferred,
    /// The ticket was not in flight.
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingSet {
    factors: BTreeMap<Ticket, Factor>,
    values: Values,
    deletions: Vec<FactorSlot>,
    in_flight: BTreeSet<Ticket>,
    /// In-flight tickets whose factor must go as soon as its slot is known.
    deferred: BTreeSet<Ticket>,
}

impl PendingSet {
    pub fn insert_factor(&mut self, ticket: Ticket, factor: Factor) {
        self.factors.insert(ticket, factor);
    }

    /// Overwrite a factor that has not been drained yet.
    pub fn edit_factor(&mut self, ticket: Ticket, factor: Factor) -> bool {
        match self.factors.get_mut(&ticket) {
            Some(slot) => {
                *slot = factor;
                true
            }
            None => false,
        }
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    /// Request removal of the factor at `location`.
    pub fn retire(&mut self, location: FactorLocation) {
        match location {
            FactorLocation::Pending(t) => {
                self.factors.remove(&t);
            }
            FactorLocation::InFlight(t) => {
                self.deferred.insert(t);
            }
            FactorLocation::Live(slot) => {
                if !self.deletions.contains(&slot) {
                    self.deletions.push(slot);
                }
            }
        }
    }

    /// Take everything staged. Drained tickets become in flight.
    pub fn drain(&mut self) -> (Values, Vec<(Ticket, Factor)>, Vec<FactorSlot>) {
        let factors: Vec<_> = std::mem::take(&mut self.factors).into_iter().collect();
        self.in_flight.extend(factors.iter().map(|(t, _)| *t));
        (
            std::mem::take(&mut self.values),
            factors,
            std::mem::take(&mut self.deletions),
        )
    }

    pub fn settle(&mut self, ticket: Ticket, slot: FactorSlot) -> Settled {
        if !self.in_flight.remove(&ticket) {
            return Settled::Unknown;
        }
        if self.deferred.remove(&ticket) {
            self.deletions.push(slot);
            Settled::Deferred
        } else {
            Settled::Bound
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty() && self.values.is_empty() && self.deletions.is_empty()
    }
}

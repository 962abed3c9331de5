//! Handles naming factors inside the engine's problem.

use std::fmt;

slotmap::new_key_type! {
    /// Engine-assigned, generation-checked handle of a live factor.
    ///
    /// Once the factor is removed the handle is stale and every engine
    /// operation using it fails.
    pub struct FactorSlot;
}

/// Crate-local name for a factor that has been emitted but whose slot is
/// not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

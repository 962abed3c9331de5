//! Boundary to the incremental nonlinear least-squares engine.

use thiserror::Error;

use crate::factors::{Factor, FactorSlot, Values, VariableKey};

/// One batch of changes applied to the engine's problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub new_values: Values,
    /// The engine assigns one slot per factor, in this order.
    pub new_factors: Vec<Factor>,
    /// Factors rewritten in place at an existing slot.
    pub replacements: Vec<(FactorSlot, Factor)>,
    pub deletions: Vec<FactorSlot>,
}

impl Submission {
    pub fn is_empty(&self) -> bool {
        self.new_values.is_empty()
            && self.new_factors.is_empty()
            && self.replacements.is_empty()
            && self.deletions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    /// Current estimate of every variable.
    pub values: Values,
    /// Slots of the submitted new factors, in submission order.
    pub slots: Vec<FactorSlot>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("optimization did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("linear system is singular")]
    Singular,

    #[error("stale factor slot {0:?}")]
    StaleSlotHandle(FactorSlot),

    #[error("factor references unknown variable {0}")]
    UnknownVariable(VariableKey),

    #[error("engine returned {got} slots for {expected} new factors")]
    SlotCountMismatch { expected: usize, got: usize },
}

/// Incremental solver that owns the factor graph.
///
/// An update either applies the whole submission or none of it. The caller
/// never relies on history beyond what it submitted.
pub trait OptimizationEngine {
    fn update(&mut self, submission: &Submission) -> Result<EngineOutput, EngineError>;
}

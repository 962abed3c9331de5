use thiserror::Error;

use super::engine::EngineError;
use crate::factors::FactorSlot;
use crate::imu::ImuError;
use crate::lifecycle::LifecycleError;

/// Failure of one estimation step. Internal state is left as it was before
/// the step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("optimization failed: {0}")]
    OptimizationFailed(#[source] EngineError),

    #[error("engine rejected stale slot {0:?}")]
    StaleSlotHandle(FactorSlot),

    #[error(transparent)]
    Imu(#[from] ImuError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<EngineError> for BackendError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::StaleSlotHandle(slot) => BackendError::StaleSlotHandle(slot),
            other => BackendError::OptimizationFailed(other),
        }
    }
}

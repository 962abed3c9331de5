//! Per-landmark factor representation and slot bookkeeping.

pub mod error;
pub mod manager;
pub mod pending;
pub mod plane;
pub mod policy;
pub mod representation;

pub use error::LifecycleError;
pub use manager::FactorLifecycleManager;
pub use pending::PendingChanges;
pub use plane::{PlaneRegion, ReconcileReport};
pub use policy::{BackendModality, LifecyclePolicy};
pub use representation::{FactorLocation, Representation};

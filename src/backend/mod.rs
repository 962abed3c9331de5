//! Per-keyframe estimation driver and its boundary to the optimization
//! engine.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod graph;
pub mod inputs;
pub mod update;

pub use config::BackendConfig;
pub use driver::IncrementalEstimationDriver;
pub use engine::{EngineError, EngineOutput, OptimizationEngine, Submission};
pub use error::BackendError;
pub use graph::GraphLedger;
pub use inputs::{KeyframeInput, TrackingStatus, VisionUpdate};
pub use update::{EstimateUpdate, LandmarkEstimate, PlaneEstimate};

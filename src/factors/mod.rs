//! Vocabulary shared with the optimization engine: variable keys, values,
//! factors, noise models and slot handles.
//!
//! # Variables
//!
//! | Key                  | Value            |
//! |----------------------|------------------|
//! | `Pose(frame)`        | body pose `SE3`  |
//! | `Velocity(frame)`    | world velocity   |
//! | `Bias(frame)`        | IMU bias         |
//! | `Landmark(id)`       | world point      |
//! | `Plane(id)`          | oriented plane   |
//!
//! Factors are identified by the engine's [`FactorSlot`] once inserted;
//! before that the backend tracks them by [`Ticket`].

pub mod factor;
pub mod keys;
pub mod noise;
pub mod slot;
pub mod values;

pub use factor::{
    Factor, FactorKind, ImuFactor, PointPlaneFactor, ProjectionFactor, StructurelessFactor,
};
pub use keys::VariableKey;
pub use noise::{NoiseModel, RobustKernel};
pub use slot::{FactorSlot, Ticket};
pub use values::{Value, Values};

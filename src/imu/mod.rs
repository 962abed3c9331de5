pub mod buffer;
pub mod error;
pub mod manager;
pub mod params;
pub mod preintegration;
pub mod sample;
pub mod state;
pub mod types;

pub use buffer::InertialBuffer;
pub use error::ImuError;
pub use manager::{PreintegrationManager, PreintegrationSnapshot};
pub use params::ImuParams;
pub use preintegration::PreintegratedSummary;
pub use sample::{ImuBias, ImuSample, Timestamp};
pub use state::NavState;

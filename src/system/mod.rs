//! Cross-thread state of the running system.

pub mod shared_state;

pub use shared_state::SharedState;

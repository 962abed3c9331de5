use thiserror::Error;

use super::sample::Timestamp;

/// Failures of inertial buffering and preintegration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImuError {
    #[error("no inertial samples between {start} ns and {end} ns")]
    InsufficientData { start: Timestamp, end: Timestamp },

    #[error("invalid time range: end {end} ns precedes start {start} ns")]
    InvalidTimeRange { start: Timestamp, end: Timestamp },

    #[error("sample at {timestamp} ns is not newer than the last buffered sample at {last} ns")]
    NonMonotonicTimestamp { timestamp: Timestamp, last: Timestamp },

    #[error("samples up to {requested} ns are not yet available (newest: {newest:?})")]
    DataNotYetAvailable {
        requested: Timestamp,
        newest: Option<Timestamp>,
    },

    #[error("samples from {requested} ns were never buffered (oldest: {oldest} ns)")]
    DataNeverAvailable {
        requested: Timestamp,
        oldest: Timestamp,
    },
}

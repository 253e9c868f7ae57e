//! Error types for the watchdog store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// The variants follow the watchdog error taxonomy: `NotPrimary` abandons
/// the current tick without commit, transient faults are retried on the
/// next tick, everything else surfaces.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("replica is not primary")]
    NotPrimary,

    #[error("replica is not ready")]
    NotReady,

    #[error("transient store fault: {0}")]
    Transient(String),

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid record: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Whether the fault should be retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::NotReady)
    }
}

//! Error types for the health-check engine.

use thiserror::Error;

use gridwatch_platform::PlatformError;
use gridwatch_state::StoreError;

/// Result type alias for engine operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Errors surfaced by the health-check engine.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Rejected at the registration boundary. Surfaced as 400.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Schedule tick values stayed occupied through every retry.
    #[error("could not place schedule entry for `{0}`")]
    ScheduleConflict(String),
}

impl HealthError {
    /// Whether the next tick should simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            HealthError::Store(e) => e.is_transient(),
            HealthError::Platform(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the current tick must be abandoned without commit.
    pub fn is_not_primary(&self) -> bool {
        matches!(self, HealthError::Store(StoreError::NotPrimary))
    }
}

//! Error types for the metrics engine.

use thiserror::Error;

use gridwatch_platform::PlatformError;
use gridwatch_state::StoreError;

/// Result type alias for engine operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors surfaced by the metrics engine.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Rejected at the registration boundary. Surfaced as 400.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl MetricsError {
    pub fn is_transient(&self) -> bool {
        match self {
            MetricsError::Store(e) => e.is_transient(),
            MetricsError::Platform(e) => e.is_transient(),
            MetricsError::InvalidArgument(_) => false,
        }
    }
}

//! Error types for warden-counters.

use thiserror::Error;

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CountError>;

/// Errors from a counter backend.
#[derive(Debug, Error)]
pub enum CountError {
    /// The backing store failed.
    #[error("counter backend error: {0}")]
    Backend(String),

    /// Stored data could not be interpreted.
    #[error("corrupt counter data: {0}")]
    Corrupt(String),
}

impl CountError {
    pub fn backend(e: impl std::fmt::Display) -> Self {
        CountError::Backend(e.to_string())
    }
}

//! Error types for warden-policy.

use thiserror::Error;

/// Result type for policy evaluation.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Dependency failures during one evaluation.
///
/// Malformed input is never an error; it yields [`crate::Outcome::NoVote`].
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("counter store: {0}")]
    Counter(#[from] warden_counters::CountError),

    #[error("account labels: {0}")]
    Labels(#[from] warden_labels::LabelError),

    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),
}

//! Error types for warden-labels.

use thiserror::Error;
use warden_records::Did;

/// Result type for label operations.
pub type Result<T> = std::result::Result<T, LabelError>;

/// Errors from identity lookup or the moderation service.
#[derive(Debug, Error)]
pub enum LabelError {
    /// The directory has no such account.
    #[error("account not found: {0}")]
    NotFound(Did),

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("moderation service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The service answered with something we could not read.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed.
    #[error("configuration error: {0}")]
    Config(String),
}

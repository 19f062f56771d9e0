//! Error types for warden-records.

use thiserror::Error;

/// Result type for record decoding and identifier parsing.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors produced while parsing identifiers or decoding payloads.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Not a syntactically valid DID.
    #[error("invalid DID: {0:?}")]
    InvalidDid(String),

    /// Not a syntactically valid AT URI.
    #[error("invalid AT URI: {0:?}")]
    InvalidUri(String),

    /// URI authority is a handle, not a DID.
    #[error("URI authority is not a DID: {0}")]
    AuthorityNotDid(String),

    /// Payload did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

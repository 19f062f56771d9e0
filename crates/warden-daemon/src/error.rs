//! Error types for the daemon.

use thiserror::Error;

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting or running the daemon.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Labels(#[from] warden_labels::LabelError),

    #[error(transparent)]
    Policy(#[from] warden_policy::PolicyError),

    #[error(transparent)]
    Consumer(#[from] warden_consumer::ConsumerError),

    #[error(transparent)]
    Counter(#[from] warden_counters::CountError),

    #[error(transparent)]
    Metrics(#[from] warden_metrics::MetricsError),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

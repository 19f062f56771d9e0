//! Error types for warden-consumer.

use thiserror::Error;

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors raised while consuming a stream.
///
/// Per-event handler failures are not here: they are logged and the event is
/// skipped.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The upstream source failed to subscribe or broke mid-stream.
    #[error("source error: {0}")]
    Source(String),

    /// Loading or saving a cursor failed.
    #[error("cursor store error: {0}")]
    Cursor(String),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A shard worker exited while events were still being dispatched.
    #[error("worker for shard {0} is gone")]
    WorkerGone(usize),
}

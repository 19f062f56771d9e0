//! Warden Stream Consumers
//!
//! A [`Consumer`] drives one resumable subscription:
//!
//! ```text
//! CursorStore ──load──▶ EventSource::subscribe(cursor)
//!                              │
//!                              ▼
//!                   shard = blake3(partition_key) % N
//!                   ┌──────┬──────┬──────┐
//!                   │ w0   │ w1   │ ...  │  EventHandler::handle
//!                   └──┬───┴──┬───┴──┬───┘
//!                      ▼      ▼      ▼
//!                   SequenceTracker (highest contiguous completed seq)
//!                              │
//!                              ▼
//!          run_persist_cursor ──save──▶ CursorStore (every interval)
//! ```
//!
//! Events sharing a partition key are handled in order by one worker; the
//! committed cursor never passes an event that has not finished. Delivery is
//! at-least-once, so handlers must be idempotent.
//!
//! # Sources
//!
//! - [`FirehoseSource`]: WebSocket, one JSON text frame per event
//! - [`PollingSource`]: repeated calls to an [`EventPoller`]

mod backoff;
mod consumer;
mod cursor;
mod error;
mod poll;
mod tracker;
mod websocket;

pub use backoff::Backoff;
pub use consumer::{Consumer, ConsumerConfig, Parallelism};
pub use cursor::{CursorStore, MemCursorStore};
pub use error::{ConsumerError, Result};
pub use poll::{EventPoller, PollingSource};
pub use tracker::SequenceTracker;
pub use websocket::{subscribe_url, FirehoseSource};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::borrow::Cow;
use warden_records::{FirehoseEvent, ModerationEvent};

/// Error type handlers return; the consumer only logs it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// An event with a stream position and an ordering key.
pub trait Sequenced: Send + 'static {
    /// Position in the upstream stream. Increases with delivery order.
    fn seq(&self) -> u64;

    /// Events with equal keys are handled in order.
    fn partition_key(&self) -> Cow<'_, str>;
}

impl Sequenced for FirehoseEvent {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn partition_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.repo)
    }
}

impl Sequenced for ModerationEvent {
    fn seq(&self) -> u64 {
        self.id
    }

    fn partition_key(&self) -> Cow<'_, str> {
        match self.subject_did() {
            Some(did) => Cow::Owned(did.into()),
            None => Cow::Borrowed(""),
        }
    }
}

/// Upstream that can be (re)subscribed from a cursor.
#[async_trait]
pub trait EventSource<E>: Send + Sync {
    /// Start delivering events after `cursor`, or from the upstream default
    /// position when `None`.
    async fn subscribe(&self, cursor: Option<u64>) -> Result<BoxStream<'static, Result<E>>>;
}

/// Per-event work.
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: E) -> std::result::Result<(), HandlerError>;
}

//! Polling sources.

use crate::error::Result;
use crate::{EventSource, Sequenced};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One page of events after a position.
#[async_trait]
pub trait EventPoller<E>: Send + Sync {
    /// Events with seq greater than `after`, oldest first. An empty page
    /// means caught up.
    async fn poll(&self, after: Option<u64>) -> Result<Vec<E>>;
}

/// Turns an [`EventPoller`] into an endless stream.
///
/// Pages are fetched back to back while they are non-empty; after an empty
/// page the source waits `interval`. A poll error ends the subscription so
/// the consumer reconnects with backoff.
pub struct PollingSource<E> {
    poller: Arc<dyn EventPoller<E>>,
    interval: Duration,
}

impl<E> PollingSource<E> {
    pub fn new(poller: Arc<dyn EventPoller<E>>, interval: Duration) -> Self {
        Self { poller, interval }
    }
}

struct PollState<E> {
    poller: Arc<dyn EventPoller<E>>,
    interval: Duration,
    after: Option<u64>,
    buffer: VecDeque<E>,
    idle: bool,
    failed: bool,
}

#[async_trait]
impl<E: Sequenced> EventSource<E> for PollingSource<E> {
    async fn subscribe(&self, cursor: Option<u64>) -> Result<BoxStream<'static, Result<E>>> {
        let state = PollState {
            poller: Arc::clone(&self.poller),
            interval: self.interval,
            after: cursor,
            buffer: VecDeque::new(),
            idle: false,
            failed: false,
        };

        let events = stream::unfold(state, |mut state| async move {
            if state.failed {
                return None;
            }
            loop {
                if let Some(event) = state.buffer.pop_front() {
                    state.after = Some(event.seq());
                    return Some((Ok(event), state));
                }
                if state.idle {
                    tokio::time::sleep(state.interval).await;
                }
                match state.poller.poll(state.after).await {
                    Ok(page) => {
                        state.idle = page.is_empty();
                        state.buffer.extend(page);
                    }
                    Err(e) => {
                        state.failed = true;
                        return Some((Err(e), state));
                    }
                }
            }
        });
        Ok(events.boxed())
    }
}

//! Moderation event feed over the moderation service's query endpoint.

use async_trait::async_trait;
use std::sync::Arc;
use warden_consumer::{ConsumerError, EventPoller};
use warden_labels::OzoneClient;
use warden_records::ModerationEvent;

/// Events fetched per request.
pub const PAGE_SIZE: usize = 100;

/// Polls `queryEvents` in ascending id order.
pub struct OzoneEventPoller {
    client: Arc<OzoneClient>,
    page_size: usize,
}

impl OzoneEventPoller {
    pub fn new(client: Arc<OzoneClient>) -> Self {
        Self {
            client,
            page_size: PAGE_SIZE,
        }
    }
}

#[async_trait]
impl EventPoller<ModerationEvent> for OzoneEventPoller {
    async fn poll(&self, after: Option<u64>) -> warden_consumer::Result<Vec<ModerationEvent>> {
        self.client
            .query_events(after, self.page_size)
            .await
            .map_err(|e| ConsumerError::Source(e.to_string()))
    }
}

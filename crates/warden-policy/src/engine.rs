//! Stream event dispatch.

use crate::policy::BotVotePolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use warden_consumer::{EventHandler, HandlerError};
use warden_records::{FirehoseEvent, ModerationEvent};

/// Cursor key and metrics label of the record stream.
pub const FIREHOSE_STREAM: &str = "firehose";

/// Cursor key and metrics label of the moderation event stream.
pub const MODERATION_STREAM: &str = "moderation";

/// Handler for both streams.
///
/// Post creations go to the policy. Moderation events that can change an
/// account's labels drop its cached metadata so the next vote refetches it.
#[derive(Clone)]
pub struct Engine {
    policy: Arc<BotVotePolicy>,
}

impl Engine {
    pub fn new(policy: Arc<BotVotePolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BotVotePolicy {
        &self.policy
    }
}

#[async_trait]
impl EventHandler<FirehoseEvent> for Engine {
    async fn handle(&self, event: FirehoseEvent) -> Result<(), HandlerError> {
        let metrics = &self.policy.context().metrics;
        let Some(post) = event.created_post() else {
            metrics.event_processed(FIREHOSE_STREAM, "ignored");
            return Ok(());
        };
        let author = match event.author() {
            Ok(author) => author,
            Err(e) => {
                debug!(seq = event.seq, repo = %event.repo, error = %e, "skipping post with invalid author");
                metrics.event_processed(FIREHOSE_STREAM, "invalid");
                return Ok(());
            }
        };

        match self.policy.evaluate(&author, post).await {
            Ok(outcome) => {
                metrics.event_processed(FIREHOSE_STREAM, outcome.as_str());
                Ok(())
            }
            Err(e) => {
                metrics.event_processed(FIREHOSE_STREAM, "error");
                Err(Box::new(e))
            }
        }
    }
}

#[async_trait]
impl EventHandler<ModerationEvent> for Engine {
    async fn handle(&self, event: ModerationEvent) -> Result<(), HandlerError> {
        let ctx = self.policy.context();
        if !event.affects_labels() {
            ctx.metrics.event_processed(MODERATION_STREAM, "ignored");
            return Ok(());
        }
        let Some(did) = event.subject_did() else {
            debug!(id = event.id, "moderation event without an account subject");
            ctx.metrics.event_processed(MODERATION_STREAM, "invalid");
            return Ok(());
        };

        if ctx.accounts.purge(&did) {
            ctx.metrics.cache_purged();
        }
        ctx.metrics.event_processed(MODERATION_STREAM, "purged");
        Ok(())
    }
}

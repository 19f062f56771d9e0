//! Firehose over WebSocket.

use crate::error::{ConsumerError, Result};
use crate::EventSource;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use warden_records::FirehoseEvent;

/// Subscription URL for `host`, resuming after `cursor`.
pub fn subscribe_url(host: &str, cursor: Option<u64>) -> String {
    let host = host.trim_end_matches('/');
    match cursor {
        Some(seq) => format!("{}/subscribe?cursor={}", host, seq),
        None => format!("{}/subscribe", host),
    }
}

/// WebSocket firehose; one JSON text frame per event.
pub struct FirehoseSource {
    host: String,
}

impl FirehoseSource {
    /// `host` includes the scheme, e.g. `wss://relay.example.com`.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl EventSource<FirehoseEvent> for FirehoseSource {
    async fn subscribe(&self, cursor: Option<u64>) -> Result<BoxStream<'static, Result<FirehoseEvent>>> {
        let url = subscribe_url(&self.host, cursor);
        tracing::debug!(url = %url, "connecting to firehose");
        let (ws, _response) = connect_async(url.as_str()).await?;

        let events = ws.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => decode_frame(&text),
                Ok(Message::Binary(bytes)) => std::str::from_utf8(&bytes).ok().and_then(decode_frame),
                Ok(_) => None,
                Err(e) => Some(Err(ConsumerError::from(e))),
            }
        });
        Ok(events.boxed())
    }
}

fn decode_frame(text: &str) -> Option<Result<FirehoseEvent>> {
    match FirehoseEvent::decode(text) {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            tracing::debug!(error = %e, "skipping undecodable firehose frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_layout() {
        assert_eq!(subscribe_url("wss://relay.example.com", None), "wss://relay.example.com/subscribe");
        assert_eq!(
            subscribe_url("wss://relay.example.com/", Some(1000)),
            "wss://relay.example.com/subscribe?cursor=1000"
        );
    }

    #[test]
    fn frames_that_do_not_decode_are_skipped() {
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame(r#"{"seq": 1}"#).is_none());
        let ok = decode_frame(
            r#"{"seq": 3, "repo": "did:plc:a", "collection": "app.bsky.feed.like", "rkey": "x", "action": "delete"}"#,
        );
        assert_eq!(ok.unwrap().unwrap().seq, 3);
    }
}

//! HTTP client for the moderation service.
//!
//! # Endpoints
//!
//! | Call | Method | Path |
//! |------|--------|------|
//! | account lookup | GET | `/xrpc/tools.ozone.moderation.getRepo?did=` |
//! | label mutation | POST | `/xrpc/tools.ozone.moderation.emitEvent` |
//! | event feed | GET | `/xrpc/tools.ozone.moderation.queryEvents?sortDirection=asc&limit=&cursor=` |
//!
//! Requests carry admin basic auth and, when configured, a rate-limit bypass
//! header.

use crate::error::{LabelError, Result};
use crate::meta::AccountMeta;
use crate::{Directory, LabelEvent, ModerationApi};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use warden_records::{Did, ModerationEvent};

const GET_REPO: &str = "/xrpc/tools.ozone.moderation.getRepo";
const EMIT_EVENT: &str = "/xrpc/tools.ozone.moderation.emitEvent";
const QUERY_EVENTS: &str = "/xrpc/tools.ozone.moderation.queryEvents";

const RATELIMIT_BYPASS_HEADER: &str = "x-ratelimit-bypass";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct OzoneConfig {
    /// Base URL, e.g. `https://mod.example.com`.
    pub host: String,
    pub admin_token: Option<String>,
    pub ratelimit_bypass: Option<String>,
    pub request_timeout: Duration,
}

impl OzoneConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            admin_token: None,
            ratelimit_bypass: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoView {
    did: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    labels: Vec<LabelView>,
}

#[derive(Debug, Deserialize)]
struct LabelView {
    val: String,
    #[serde(default)]
    neg: bool,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for account lookups, label mutations and the moderation event feed.
pub struct OzoneClient {
    http: reqwest::Client,
    config: OzoneConfig,
}

impl OzoneClient {
    pub fn new(config: OzoneConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LabelError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host, path)
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.config.admin_token {
            request = request.basic_auth("admin", Some(token));
        }
        if let Some(bypass) = &self.config.ratelimit_bypass {
            request = request.header(RATELIMIT_BYPASS_HEADER, bypass);
        }
        request
    }

    /// Moderation events with id greater than `after`, oldest first.
    ///
    /// Undecodable events are skipped.
    pub async fn query_events(&self, after: Option<u64>, limit: usize) -> Result<Vec<ModerationEvent>> {
        let mut query = vec![
            ("sortDirection", "asc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = after {
            query.push(("cursor", after.to_string()));
        }
        let request = self.http.get(self.url(QUERY_EVENTS)).query(&query);
        let response = check(self.authorize(request).send().await?).await?;
        let page: EventPage = response
            .json()
            .await
            .map_err(|e| LabelError::InvalidResponse(e.to_string()))?;
        Ok(decode_events(page.events, after))
    }
}

#[async_trait]
impl Directory for OzoneClient {
    async fn lookup_account(&self, did: &Did) -> Result<AccountMeta> {
        let request = self.http.get(self.url(GET_REPO)).query(&[("did", did.as_str())]);
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LabelError::NotFound(did.clone()));
        }
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<XrpcError>(&body) {
                Ok(XrpcError { error: Some(e), .. }) if e == "RepoNotFound" => LabelError::NotFound(did.clone()),
                _ => LabelError::Api {
                    status: status.as_u16(),
                    message: body,
                },
            });
        }
        let view: RepoView = check(response)
            .await?
            .json()
            .await
            .map_err(|e| LabelError::InvalidResponse(e.to_string()))?;
        repo_view_to_meta(view)
    }
}

#[async_trait]
impl ModerationApi for OzoneClient {
    async fn emit_label_event(&self, event: &LabelEvent) -> Result<()> {
        let request = self.http.post(self.url(EMIT_EVENT)).json(&emit_event_body(event));
        check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

/// Map an error status to [`LabelError::Api`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<XrpcError>(&body) {
        Ok(XrpcError {
            message: Some(message), ..
        }) => message,
        _ => body,
    };
    Err(LabelError::Api {
        status: status.as_u16(),
        message,
    })
}

fn repo_view_to_meta(view: RepoView) -> Result<AccountMeta> {
    let did = Did::parse(&view.did).map_err(|e| LabelError::InvalidResponse(e.to_string()))?;
    let mut meta = AccountMeta::new(did);
    meta.handle = view.handle;
    // a negation in the listing cancels the positive label
    let (negated, applied): (Vec<_>, Vec<_>) = view.labels.into_iter().partition(|l| l.neg);
    meta.labels = applied
        .into_iter()
        .map(|l| l.val)
        .filter(|val| !negated.iter().any(|n| &n.val == val))
        .collect();
    Ok(meta)
}

fn emit_event_body(event: &LabelEvent) -> Value {
    json!({
        "event": {
            "$type": "tools.ozone.moderation.defs#modEventLabel",
            "createLabelVals": event.create_label_vals,
            "negateLabelVals": event.negate_label_vals,
            "comment": event.comment,
        },
        "subject": {
            "$type": "com.atproto.admin.defs#repoRef",
            "did": event.subject.as_str(),
        },
        "createdBy": event.created_by.as_str(),
    })
}

fn decode_events(raw: Vec<Value>, after: Option<u64>) -> Vec<ModerationEvent> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<ModerationEvent>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable moderation event");
                None
            }
        })
        .filter(|event| after.map_or(true, |a| event.id > a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_records::ModerationAction;

    #[test]
    fn emit_body_shape() {
        let event = LabelEvent {
            created_by: Did::parse("did:plc:operator").unwrap(),
            subject: Did::parse("did:plc:bot").unwrap(),
            create_label_vals: vec!["bad-bot".to_string()],
            negate_label_vals: vec![],
            comment: "auto-adding label".to_string(),
        };
        let body = emit_event_body(&event);
        assert_eq!(body["event"]["$type"], "tools.ozone.moderation.defs#modEventLabel");
        assert_eq!(body["event"]["createLabelVals"][0], "bad-bot");
        assert_eq!(body["event"]["negateLabelVals"].as_array().unwrap().len(), 0);
        assert_eq!(body["subject"]["$type"], "com.atproto.admin.defs#repoRef");
        assert_eq!(body["subject"]["did"], "did:plc:bot");
        assert_eq!(body["createdBy"], "did:plc:operator");
    }

    #[test]
    fn negated_labels_are_not_applied() {
        let view: RepoView = serde_json::from_value(json!({
            "did": "did:plc:bot",
            "handle": "bot.example.com",
            "labels": [
                {"val": "jabroni"},
                {"val": "bad-bot"},
                {"val": "bad-bot", "neg": true}
            ]
        }))
        .unwrap();
        let meta = repo_view_to_meta(view).unwrap();
        assert_eq!(meta.handle.as_deref(), Some("bot.example.com"));
        assert!(meta.has_label("jabroni"));
        assert!(!meta.has_label("bad-bot"));
    }

    #[test]
    fn invalid_did_in_response() {
        let view: RepoView = serde_json::from_value(json!({"did": "alice"})).unwrap();
        assert!(matches!(repo_view_to_meta(view), Err(LabelError::InvalidResponse(_))));
    }

    #[test]
    fn event_page_filters_and_skips() {
        let raw = vec![
            json!({"id": 4, "subject": {"did": "did:plc:a"}, "event": {"$type": "tools.ozone.moderation.defs#modEventTakedown"}}),
            json!({"id": 5, "subject": {"did": "did:plc:a"}, "event": {"$type": "tools.ozone.moderation.defs#modEventLabel", "createLabelVals": ["jabroni"]}}),
            json!({"id": "not a number"}),
            json!({"id": 6, "subject": {"uri": "at://did:plc:b/app.bsky.feed.post/1"}, "event": {"$type": "tools.ozone.moderation.defs#modEventComment"}}),
        ];
        let events = decode_events(raw, Some(4));
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5, 6]);
        assert!(matches!(events[0].action, ModerationAction::Label { .. }));
        assert_eq!(events[1].action, ModerationAction::Other);
    }

    #[test]
    fn host_is_normalized() {
        let config = OzoneConfig::new("https://mod.example.com/");
        assert_eq!(config.host, "https://mod.example.com");
        let client = OzoneClient::new(config).unwrap();
        assert_eq!(client.url(GET_REPO), "https://mod.example.com/xrpc/tools.ozone.moderation.getRepo");
    }
}

//! Stream events.

use crate::did::Did;
use crate::error::Result;
use crate::record::{Post, Record};
use crate::uri::AtUri;
use serde::{Deserialize, Serialize};

/// Kind of repository operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoAction {
    Create,
    Update,
    Delete,
}

/// One repository operation from the primary firehose.
///
/// `repo` is kept raw so that an event with a bad author identifier still
/// carries its sequence number to the cursor tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirehoseEvent {
    pub seq: u64,
    pub repo: String,
    pub collection: String,
    pub rkey: String,
    pub action: RepoAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

#[derive(Deserialize)]
struct FirehoseFrame {
    seq: u64,
    repo: String,
    collection: String,
    rkey: String,
    action: RepoAction,
    #[serde(default)]
    record: Option<serde_json::Value>,
}

impl FirehoseEvent {
    /// Decode a JSON text frame.
    ///
    /// Fails only when the envelope itself is unusable. A record payload
    /// that does not decode is dropped (`record: None`) so the event still
    /// advances the cursor.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: FirehoseFrame = serde_json::from_str(text)?;
        let record = match frame.record {
            Some(value) => match Record::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(seq = frame.seq, repo = %frame.repo, error = %e, "dropping malformed record payload");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            seq: frame.seq,
            repo: frame.repo,
            collection: frame.collection,
            rkey: frame.rkey,
            action: frame.action,
            record,
        })
    }

    /// The authoring account.
    pub fn author(&self) -> Result<Did> {
        Did::parse(&self.repo)
    }

    /// The record's own URI.
    pub fn uri(&self) -> String {
        format!("at://{}/{}/{}", self.repo, self.collection, self.rkey)
    }

    /// The post body, if this event creates a post.
    pub fn created_post(&self) -> Option<&Post> {
        match (&self.action, &self.record) {
            (RepoAction::Create, Some(Record::Post(post))) => Some(post),
            _ => None,
        }
    }
}

/// Subject of a moderation event: an account, or a record owned by one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationSubject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// What the moderator did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ModerationAction {
    #[serde(rename = "tools.ozone.moderation.defs#modEventLabel")]
    Label {
        #[serde(rename = "createLabelVals", default)]
        create: Vec<String>,
        #[serde(rename = "negateLabelVals", default)]
        negate: Vec<String>,
    },
    #[serde(rename = "tools.ozone.moderation.defs#modEventTakedown")]
    Takedown,
    #[serde(rename = "tools.ozone.moderation.defs#modEventReverseTakedown")]
    ReverseTakedown,
    #[serde(other)]
    Other,
}

/// One moderator action from the moderation event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationEvent {
    pub id: u64,
    pub subject: ModerationSubject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(rename = "event")]
    pub action: ModerationAction,
}

impl ModerationEvent {
    /// The account the event is about. Record subjects resolve to the
    /// record's owner.
    pub fn subject_did(&self) -> Option<Did> {
        if let Some(did) = &self.subject.did {
            return Did::parse(did).ok();
        }
        let uri = AtUri::parse(self.subject.uri.as_deref()?).ok()?;
        uri.authority_did().ok()
    }

    /// Whether this event can change an account's label set.
    pub fn affects_labels(&self) -> bool {
        matches!(
            self.action,
            ModerationAction::Label { .. } | ModerationAction::Takedown | ModerationAction::ReverseTakedown
        )
    }
}

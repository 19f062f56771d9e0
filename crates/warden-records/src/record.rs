//! Record payloads.
//!
//! Identifiers inside records (reply URIs, mention DIDs) are kept as raw
//! strings. A malformed reference must not fail decoding of the whole
//! record; the vote extractor decides what to do with it.

use serde::{Deserialize, Serialize};

/// A repository record, discriminated by its `$type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Record {
    #[serde(rename = "app.bsky.feed.post")]
    Post(Post),
    #[serde(rename = "app.bsky.feed.like")]
    Like(Like),
    #[serde(rename = "app.bsky.feed.repost")]
    Repost(Repost),
    #[serde(rename = "app.bsky.graph.follow")]
    Follow(Follow),
    /// Any record type this service has no rules for.
    #[serde(other)]
    Unknown,
}

impl Record {
    /// Decode a record from a JSON value.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            Record::Post(post) => Some(post),
            _ => None,
        }
    }
}

/// A text post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Post {
    /// Create a plain text post with no reply context or facets.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the reply context.
    #[must_use]
    pub fn with_reply(mut self, root: impl Into<String>, parent: impl Into<String>) -> Self {
        self.reply = Some(ReplyRef {
            root: StrongRef::new(root),
            parent: StrongRef::new(parent),
        });
        self
    }

    /// Add a single-feature mention facet.
    #[must_use]
    pub fn with_mention(mut self, did: impl Into<String>) -> Self {
        self.facets.push(Facet {
            index: None,
            features: vec![FacetFeature::Mention { did: did.into() }],
        });
        self
    }

    /// All mention targets across every facet, in order.
    pub fn mentions(&self) -> impl Iterator<Item = &str> {
        self.facets.iter().flat_map(|facet| {
            facet.features.iter().filter_map(|feature| match feature {
                FacetFeature::Mention { did } => Some(did.as_str()),
                _ => None,
            })
        })
    }
}

/// Reply context: the thread root and the immediate parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

/// A reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

impl StrongRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: String::new(),
        }
    }
}

/// Annotation over a byte range of post text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ByteSlice>,
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

/// UTF-8 byte range within post text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

/// What a facet marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub subject: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repost {
    pub subject: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub subject: String,
}

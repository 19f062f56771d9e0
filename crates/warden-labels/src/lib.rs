//! Warden Account Labels
//!
//! The authoritative label set of every account lives in an external
//! moderation service. This crate only reads it (through a cache) and asks
//! for changes to it.
//!
//! # Architecture
//!
//! - **[`Directory`]**: identity lookup, `Did → AccountMeta`
//! - **[`ModerationApi`]**: the single mutation surface (`emit_label_event`)
//! - **[`AccountCache`]**: TTL cache of metadata snapshots
//! - **[`AccountLabeler`]**: ties the three together; idempotent
//!   `add_label` / `remove_label` attributed to an operator identity
//! - **[`OzoneClient`]**: HTTP implementation of both traits
//!
//! [`memory`] holds in-process implementations used by tests and local runs.

mod cache;
mod error;
mod labeler;
mod meta;
mod ozone;

pub mod memory;

pub use cache::{AccountCache, CacheConfig};
pub use error::{LabelError, Result};
pub use labeler::{AccountLabeler, LabelChange, ADD_LABEL_COMMENT, REMOVE_LABEL_COMMENT};
pub use meta::AccountMeta;
pub use ozone::{OzoneClient, OzoneConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_records::Did;

/// Resolves an account identifier to its metadata.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetch the current metadata. Unknown accounts are [`LabelError::NotFound`].
    async fn lookup_account(&self, did: &Did) -> Result<AccountMeta>;
}

/// Sink for label mutations.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn emit_label_event(&self, event: &LabelEvent) -> Result<()>;
}

/// A request to add and/or negate labels on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEvent {
    pub created_by: Did,
    pub subject: Did,
    pub create_label_vals: Vec<String>,
    pub negate_label_vals: Vec<String>,
    pub comment: String,
}

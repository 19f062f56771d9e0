//! Idempotent label mutations.

use crate::cache::{AccountCache, CacheConfig};
use crate::error::Result;
use crate::meta::AccountMeta;
use crate::{Directory, LabelEvent, ModerationApi};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use warden_records::Did;

/// Audit comment attached to automatic additions.
pub const ADD_LABEL_COMMENT: &str = "auto-adding label";

/// Audit comment attached to automatic removals.
pub const REMOVE_LABEL_COMMENT: &str = "auto-removing label";

/// What a mutation request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelChange {
    /// A label event was emitted.
    Applied,
    /// The account was already in the requested state.
    Unchanged,
    /// No moderation client is configured.
    Skipped,
}

impl LabelChange {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LabelChange::Applied => "applied",
            LabelChange::Unchanged => "unchanged",
            LabelChange::Skipped => "skipped",
        }
    }
}

struct Moderator {
    api: Arc<dyn ModerationApi>,
    operator: Did,
}

/// Reads account metadata and mutates labels on the operator's behalf.
///
/// Mutations for the same account are serialized, and each re-checks the
/// latest known state under the lock, so concurrent attempts to add the same
/// label produce one moderation event.
pub struct AccountLabeler {
    directory: Arc<dyn Directory>,
    moderation: Option<Moderator>,
    cache: AccountCache,
    locks: DashMap<Did, Arc<Mutex<()>>>,
}

impl AccountLabeler {
    /// Read-only labeler: mutations are skipped.
    pub fn new(directory: Arc<dyn Directory>, cache: CacheConfig) -> Self {
        Self {
            directory,
            moderation: None,
            cache: AccountCache::new(cache),
            locks: DashMap::new(),
        }
    }

    /// Enable mutations, attributed to `operator`.
    #[must_use]
    pub fn with_moderation(mut self, api: Arc<dyn ModerationApi>, operator: Did) -> Self {
        self.moderation = Some(Moderator { api, operator });
        self
    }

    /// Whether label mutations will be sent anywhere.
    pub fn can_mutate(&self) -> bool {
        self.moderation.is_some()
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    /// Current metadata snapshot, served from cache when fresh.
    pub async fn account_meta(&self, did: &Did) -> Result<Arc<AccountMeta>> {
        if let Some(meta) = self.cache.get(did) {
            return Ok(meta);
        }
        let meta = self.directory.lookup_account(did).await?;
        Ok(self.cache.insert(meta))
    }

    pub async fn has_label(&self, did: &Did, label: &str) -> Result<bool> {
        Ok(self.account_meta(did).await?.has_label(label))
    }

    /// Ensure `label` is applied to the account described by `meta`.
    pub async fn add_label(&self, meta: &AccountMeta, label: &str) -> Result<LabelChange> {
        self.mutate(meta, label, true).await
    }

    /// Ensure `label` is not applied to the account described by `meta`.
    pub async fn remove_label(&self, meta: &AccountMeta, label: &str) -> Result<LabelChange> {
        self.mutate(meta, label, false).await
    }

    /// Drop any cached snapshot for `did`.
    pub fn purge(&self, did: &Did) -> bool {
        let purged = self.cache.purge(did);
        if purged {
            tracing::debug!(did = %did, "purged account metadata");
        }
        purged
    }

    async fn mutate(&self, meta: &AccountMeta, label: &str, present: bool) -> Result<LabelChange> {
        if meta.has_label(label) == present {
            return Ok(LabelChange::Unchanged);
        }
        let Some(moderator) = &self.moderation else {
            tracing::warn!(
                did = %meta.did,
                label,
                "no moderation client configured, skipping label change"
            );
            return Ok(LabelChange::Skipped);
        };

        let lock = Arc::clone(self.locks.entry(meta.did.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.mutate_locked(moderator, meta, label, present).await
        };
        drop(lock);
        self.locks.remove_if(&meta.did, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn mutate_locked(
        &self,
        moderator: &Moderator,
        meta: &AccountMeta,
        label: &str,
        present: bool,
    ) -> Result<LabelChange> {
        // A concurrent mutation may have landed while we waited.
        if let Some(latest) = self.cache.get(&meta.did) {
            if latest.has_label(label) == present {
                return Ok(LabelChange::Unchanged);
            }
        }

        let (create, negate, comment) = if present {
            (vec![label.to_string()], Vec::new(), ADD_LABEL_COMMENT)
        } else {
            (Vec::new(), vec![label.to_string()], REMOVE_LABEL_COMMENT)
        };
        let event = LabelEvent {
            created_by: moderator.operator.clone(),
            subject: meta.did.clone(),
            create_label_vals: create,
            negate_label_vals: negate,
            comment: comment.to_string(),
        };

        tracing::info!(did = %meta.did, label, add = present, "{}", comment);
        if let Err(e) = moderator.api.emit_label_event(&event).await {
            tracing::error!(did = %meta.did, label, error = %e, "label change failed");
            return Err(e);
        }

        self.cache.apply_label(meta, label, present);
        Ok(LabelChange::Applied)
    }
}

//! In-process [`Directory`] and [`ModerationApi`].
//!
//! `RecordingModeration` keeps every event it receives and, when linked to a
//! `MemDirectory`, applies the label change to it the way the real service
//! would.

use crate::error::{LabelError, Result};
use crate::meta::AccountMeta;
use crate::{Directory, LabelEvent, ModerationApi};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use warden_records::Did;

/// Directory backed by a map.
#[derive(Default)]
pub struct MemDirectory {
    accounts: RwLock<HashMap<Did, AccountMeta>>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account.
    pub fn insert(&self, meta: AccountMeta) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(meta.did.clone(), meta);
        }
    }

    pub fn get(&self, did: &Did) -> Option<AccountMeta> {
        self.accounts.read().ok()?.get(did).cloned()
    }

    fn apply(&self, event: &LabelEvent) {
        let Ok(mut accounts) = self.accounts.write() else {
            return;
        };
        let meta = accounts
            .entry(event.subject.clone())
            .or_insert_with(|| AccountMeta::new(event.subject.clone()));
        for label in &event.negate_label_vals {
            meta.labels.remove(label);
        }
        for label in &event.create_label_vals {
            meta.labels.insert(label.clone());
        }
    }
}

#[async_trait]
impl Directory for MemDirectory {
    async fn lookup_account(&self, did: &Did) -> Result<AccountMeta> {
        self.get(did).ok_or_else(|| LabelError::NotFound(did.clone()))
    }
}

/// Moderation sink that records events.
#[derive(Default)]
pub struct RecordingModeration {
    events: RwLock<Vec<LabelEvent>>,
    failures: AtomicUsize,
    directory: Option<Arc<MemDirectory>>,
}

impl RecordingModeration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply accepted events to `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<MemDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Reject the next `n` events with a 503.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Every accepted event, in arrival order.
    pub fn events(&self) -> Vec<LabelEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Accepted events that touch `label` on `subject`.
    pub fn events_for(&self, subject: &Did, label: &str) -> Vec<LabelEvent> {
        self.events()
            .into_iter()
            .filter(|e| {
                &e.subject == subject
                    && (e.create_label_vals.iter().any(|l| l == label)
                        || e.negate_label_vals.iter().any(|l| l == label))
            })
            .collect()
    }
}

#[async_trait]
impl ModerationApi for RecordingModeration {
    async fn emit_label_event(&self, event: &LabelEvent) -> Result<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LabelError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if let Some(directory) = &self.directory {
            directory.apply(event);
        }
        if let Ok(mut events) = self.events.write() {
            events.push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn linked_directory_sees_label_changes() {
        let did = Did::parse("did:plc:bot").unwrap();
        let directory = Arc::new(MemDirectory::new());
        directory.insert(AccountMeta::new(did.clone()));
        let moderation = RecordingModeration::new().with_directory(directory.clone());

        moderation
            .emit_label_event(&LabelEvent {
                created_by: Did::parse("did:plc:op").unwrap(),
                subject: did.clone(),
                create_label_vals: vec!["bad-bot".to_string()],
                negate_label_vals: vec![],
                comment: "test".to_string(),
            })
            .await
            .unwrap();

        let meta = directory.lookup_account(&did).await.unwrap();
        assert!(meta.has_label("bad-bot"));
        assert_eq!(moderation.events_for(&did, "bad-bot").len(), 1);
        assert!(moderation.events_for(&did, "good-bot").is_empty());
    }
}

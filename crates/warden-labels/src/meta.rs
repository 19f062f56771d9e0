//! Account metadata snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use warden_records::Did;

/// Read-only projection of an account: identity plus currently applied labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub did: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
}

impl AccountMeta {
    /// Metadata with no handle and no labels.
    pub fn new(did: Did) -> Self {
        Self {
            did,
            handle: None,
            labels: BTreeSet::new(),
        }
    }

    /// Builder-style label addition.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Whether any of `labels` is applied.
    pub fn has_any_label<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels.iter().any(|l| self.has_label(l.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_queries() {
        let meta = AccountMeta::new(Did::parse("did:plc:a").unwrap()).with_label("jabroni");
        assert!(meta.has_label("jabroni"));
        assert!(!meta.has_label("bad-bot"));
        assert!(meta.has_any_label(&["bad-bot", "jabroni"]));
        assert!(!meta.has_any_label::<&str>(&[]));
    }
}

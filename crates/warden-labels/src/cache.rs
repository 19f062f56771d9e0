//! Metadata cache.
//!
//! Snapshots are served until they expire or are purged. A successful label
//! mutation writes through, so a repeat decision in the same process sees
//! the new label without waiting for the TTL.

use crate::meta::AccountMeta;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_records::Did;

/// Default snapshot lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 50_000;

/// Cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

struct Entry {
    meta: Arc<AccountMeta>,
    expires_at: Instant,
}

/// TTL cache of [`AccountMeta`] keyed by account.
pub struct AccountCache {
    entries: DashMap<Did, Entry>,
    config: CacheConfig,
}

impl AccountCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Live snapshot, if any. Expired entries are dropped on read.
    pub fn get(&self, did: &Did) -> Option<Arc<AccountMeta>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(did) {
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.meta));
            }
        } else {
            return None;
        }
        self.entries.remove_if(did, |_, e| e.expires_at <= now);
        None
    }

    /// Store a fresh snapshot.
    pub fn insert(&self, meta: AccountMeta) -> Arc<AccountMeta> {
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(&meta.did) {
            self.evict();
        }
        let meta = Arc::new(meta);
        self.entries.insert(
            meta.did.clone(),
            Entry {
                meta: Arc::clone(&meta),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
        meta
    }

    /// Record a label change made by this process.
    ///
    /// Updates the cached snapshot if there is one, otherwise caches `base`
    /// with the change applied.
    pub fn apply_label(&self, base: &AccountMeta, label: &str, present: bool) {
        let mut meta = self
            .get(&base.did)
            .map(|m| (*m).clone())
            .unwrap_or_else(|| base.clone());
        if present {
            meta.labels.insert(label.to_string());
        } else {
            meta.labels.remove(label);
        }
        self.insert(meta);
    }

    /// Forget an account. Returns whether anything was cached.
    pub fn purge(&self, did: &Did) -> bool {
        self.entries.remove(did).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries; if still full, drop the entries closest to expiry.
    fn evict(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);

        let target = self.config.max_entries.saturating_sub(self.config.max_entries / 10).max(1);
        if self.entries.len() < target {
            return;
        }
        let mut by_expiry: Vec<(Did, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, at)| *at);
        let excess = self.entries.len() + 1 - target;
        for (did, _) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&did);
        }
        tracing::debug!(evicted = excess, "account cache full");
    }
}

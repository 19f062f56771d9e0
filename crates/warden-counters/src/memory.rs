//! In-process counter store.

use crate::error::Result;
use crate::period::{distinct_key, system_clock, Clock, Period};
use crate::CountStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

/// One member set for one bucket.
#[derive(Debug)]
struct Bucket {
    members: HashSet<String>,
    closes_at: Option<DateTime<Utc>>,
}

impl Bucket {
    fn new(closes_at: Option<DateTime<Utc>>) -> Self {
        Self {
            members: HashSet::new(),
            closes_at,
        }
    }

    fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.closes_at.is_some_and(|t| now >= t)
    }
}

/// Non-durable, single-process [`CountStore`].
///
/// Each bucket is guarded by its DashMap shard lock, so the set-add and the
/// cardinality read that follows it are one atomic step.
pub struct MemCountStore {
    buckets: DashMap<String, Bucket>,
    clock: Clock,
}

impl Default for MemCountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemCountStore {
    /// Create an empty store on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty store with an injected clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    fn add(&self, namespace: &str, key: &str, member: &str, period: Period, now: DateTime<Utc>) -> u64 {
        let mut bucket = self
            .buckets
            .entry(distinct_key(namespace, key, period, now))
            .or_insert_with(|| Bucket::new(period.closes_at(now)));
        if !bucket.members.contains(member) {
            bucket.members.insert(member.to_string());
        }
        bucket.members.len() as u64
    }

    /// Drop buckets whose window has closed. Returns how many were removed.
    ///
    /// Bucket keys carry their window, so a closed bucket is never written
    /// again; something has to call this periodically.
    pub fn prune_expired(&self) -> usize {
        let now = (self.clock)();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_closed(now));
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, "pruned closed counter buckets");
        }
        removed
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl CountStore for MemCountStore {
    async fn increment_distinct(&self, namespace: &str, key: &str, member: &str) -> Result<u64> {
        let now = (self.clock)();
        let mut total = 0;
        for period in Period::ALL {
            let count = self.add(namespace, key, member, period, now);
            if period == Period::Total {
                total = count;
            }
        }
        Ok(total)
    }

    async fn get_count_distinct(&self, namespace: &str, key: &str, period: Period) -> Result<u64> {
        let now = (self.clock)();
        let count = self
            .buckets
            .get(&distinct_key(namespace, key, period, now))
            .filter(|bucket| !bucket.is_closed(now))
            .map(|bucket| bucket.members.len() as u64)
            .unwrap_or(0);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::MemCountStore;
    use crate::{Clock, CountStore, Period};
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn manual_clock(start: &str) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(
            DateTime::parse_from_rfc3339(start).unwrap().with_timezone(&Utc),
        ));
        let handle = Arc::clone(&now);
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    #[tokio::test]
    async fn repeat_member_does_not_count_twice() {
        let store = MemCountStore::new();
        assert_eq!(store.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap(), 1);
        assert_eq!(store.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap(), 1);
        assert_eq!(store.increment_distinct("good-bot", "did:plc:bot", "did:plc:b").await.unwrap(), 2);

        for period in Period::ALL {
            assert_eq!(store.get_count_distinct("good-bot", "did:plc:bot", period).await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn namespaces_and_keys_are_independent() {
        let store = MemCountStore::new();
        store.increment_distinct("good-bot", "did:plc:x", "did:plc:a").await.unwrap();
        store.increment_distinct("bad-bot", "did:plc:x", "did:plc:a").await.unwrap();
        store.increment_distinct("bad-bot", "did:plc:y", "did:plc:a").await.unwrap();

        assert_eq!(store.get_count_distinct("good-bot", "did:plc:x", Period::Total).await.unwrap(), 1);
        assert_eq!(store.get_count_distinct("bad-bot", "did:plc:x", Period::Total).await.unwrap(), 1);
        assert_eq!(store.get_count_distinct("good-bot", "did:plc:y", Period::Total).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hour_bucket_rolls_over_but_total_does_not() {
        let (clock, now) = manual_clock("2024-03-09T17:59:00Z");
        let store = MemCountStore::with_clock(clock);
        store.increment_distinct("bad-bot", "did:plc:bot", "did:plc:a").await.unwrap();

        *now.lock().unwrap() += Duration::minutes(2);
        store.increment_distinct("bad-bot", "did:plc:bot", "did:plc:b").await.unwrap();

        assert_eq!(store.get_count_distinct("bad-bot", "did:plc:bot", Period::Hour).await.unwrap(), 1);
        assert_eq!(store.get_count_distinct("bad-bot", "did:plc:bot", Period::Day).await.unwrap(), 2);
        assert_eq!(store.get_count_distinct("bad-bot", "did:plc:bot", Period::Total).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn prune_removes_closed_buckets_only() {
        let (clock, now) = manual_clock("2024-03-09T17:00:00Z");
        let store = MemCountStore::with_clock(clock);
        store.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap();
        assert_eq!(store.len(), 3);

        *now.lock().unwrap() += Duration::hours(1);
        assert_eq!(store.prune_expired(), 1);

        *now.lock().unwrap() += Duration::days(1);
        assert_eq!(store.prune_expired(), 1);
        assert_eq!(store.get_count_distinct("good-bot", "did:plc:bot", Period::Total).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemCountStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                // every voter votes three times
                for _ in 0..3 {
                    store
                        .increment_distinct("good-bot", "did:plc:bot", &format!("did:plc:voter{}", i % 40))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_count_distinct("good-bot", "did:plc:bot", Period::Total).await.unwrap(), 40);
    }

    proptest! {
        #[test]
        fn count_equals_distinct_voters(voters in proptest::collection::vec(0u8..20, 0..100)) {
            let store = MemCountStore::new();
            let mut last = 0;
            for v in &voters {
                last = tokio_test::block_on(
                    store.increment_distinct("good-bot", "did:plc:bot", &format!("did:plc:v{}", v)),
                ).unwrap();
            }
            let distinct: std::collections::HashSet<_> = voters.iter().collect();
            prop_assert_eq!(last, distinct.len() as u64);
            let total = tokio_test::block_on(
                store.get_count_distinct("good-bot", "did:plc:bot", Period::Total),
            ).unwrap();
            prop_assert_eq!(total, distinct.len() as u64);
        }
    }
}

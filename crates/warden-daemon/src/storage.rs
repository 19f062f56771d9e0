//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! - `distinct/{bucket}/{namespace}/{key}/{member}` one entry per counted member
//! - `cursor:{stream}` last persisted sequence number, JSON encoded
//!
//! A count is the number of member entries under a set prefix. Closed Day
//! and Hour buckets are kept but never read again.

use crate::error::Result;
use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use warden_consumer::{ConsumerError, CursorStore};
use warden_counters::{distinct_key, system_clock, Clock, CountError, CountStore, Period};

/// RocksDB-backed counters and cursors.
pub struct Storage {
    db: DB,
    clock: Clock,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_clock(path, system_clock())
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Clock) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db, clock })
    }

    // --- Counters ---

    /// Add `member` to every period's set. Existing members are overwritten
    /// in place, so repeats never change a count.
    pub fn add_member(&self, namespace: &str, key: &str, member: &str) -> Result<u64> {
        let now = (self.clock)();
        let mut batch = WriteBatch::default();
        for period in Period::ALL {
            let set = distinct_key(namespace, key, period, now);
            batch.put(member_key(&set, member).as_bytes(), b"");
        }
        self.db.write(batch)?;
        self.count_members(&distinct_key(namespace, key, Period::Total, now))
    }

    /// Members in the current bucket of `period`.
    pub fn member_count(&self, namespace: &str, key: &str, period: Period) -> Result<u64> {
        let now = (self.clock)();
        self.count_members(&distinct_key(namespace, key, period, now))
    }

    fn count_members(&self, set: &str) -> Result<u64> {
        let prefix = format!("{}/", set);
        let mut count = 0;

        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, _) = item?;
            if key.starts_with(prefix.as_bytes()) {
                count += 1;
            } else {
                break;
            }
        }

        Ok(count)
    }

    // --- Cursors ---

    /// Store the last processed sequence of a stream.
    pub fn put_cursor(&self, stream: &str, seq: u64) -> Result<()> {
        let key = format!("cursor:{}", stream);
        let value = serde_json::to_vec(&seq)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    /// Get the last processed sequence of a stream.
    pub fn get_cursor(&self, stream: &str) -> Result<Option<u64>> {
        let key = format!("cursor:{}", stream);
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

fn member_key(set: &str, member: &str) -> String {
    format!("{}/{}", set, member)
}

#[async_trait]
impl CountStore for Storage {
    async fn increment_distinct(&self, namespace: &str, key: &str, member: &str) -> warden_counters::Result<u64> {
        self.add_member(namespace, key, member).map_err(CountError::backend)
    }

    async fn get_count_distinct(&self, namespace: &str, key: &str, period: Period) -> warden_counters::Result<u64> {
        self.member_count(namespace, key, period).map_err(CountError::backend)
    }
}

#[async_trait]
impl CursorStore for Storage {
    async fn load_cursor(&self, stream: &str) -> warden_consumer::Result<Option<u64>> {
        self.get_cursor(stream).map_err(|e| ConsumerError::Cursor(e.to_string()))
    }

    async fn save_cursor(&self, stream: &str, seq: u64) -> warden_consumer::Result<()> {
        self.put_cursor(stream, seq).map_err(|e| ConsumerError::Cursor(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn repeat_members_count_once() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        assert_eq!(storage.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap(), 1);
        assert_eq!(storage.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap(), 1);
        assert_eq!(storage.increment_distinct("good-bot", "did:plc:bot", "did:plc:b").await.unwrap(), 2);

        // neighbouring sets share a prefix but not a count
        storage.increment_distinct("good-bot", "did:plc:bot2", "did:plc:a").await.unwrap();
        storage.increment_distinct("bad-bot", "did:plc:bot", "did:plc:c").await.unwrap();

        for period in Period::ALL {
            let count = storage.get_count_distinct("good-bot", "did:plc:bot", period).await.unwrap();
            assert_eq!(count, 2, "{}", period);
        }
    }

    #[tokio::test]
    async fn closed_buckets_are_not_read() {
        let dir = tempdir().unwrap();
        let now = Arc::new(Mutex::new(at("2024-03-09T17:45:00Z")));
        let clock_now = Arc::clone(&now);
        let clock: Clock = Arc::new(move || *clock_now.lock().unwrap());
        let storage = Storage::open_with_clock(dir.path(), clock).unwrap();

        storage.increment_distinct("bad-bot", "did:plc:bot", "did:plc:a").await.unwrap();
        *now.lock().unwrap() = at("2024-03-09T18:05:00Z");
        storage.increment_distinct("bad-bot", "did:plc:bot", "did:plc:b").await.unwrap();

        assert_eq!(storage.get_count_distinct("bad-bot", "did:plc:bot", Period::Hour).await.unwrap(), 1);
        assert_eq!(storage.get_count_distinct("bad-bot", "did:plc:bot", Period::Day).await.unwrap(), 2);
        assert_eq!(storage.get_count_distinct("bad-bot", "did:plc:bot", Period::Total).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counts_and_cursors_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap();
            storage.save_cursor("firehose", 1000).await.unwrap();
        }

        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.load_cursor("firehose").await.unwrap(), Some(1000));
        assert_eq!(storage.load_cursor("moderation").await.unwrap(), None);
        assert_eq!(storage.increment_distinct("good-bot", "did:plc:bot", "did:plc:a").await.unwrap(), 1);
    }
}

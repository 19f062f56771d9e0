//! Redis-backed counters and cursors.
//!
//! Each `(bucket, namespace, key)` set is a Redis set under
//! [`distinct_key`]. An increment runs `SADD` for every period plus the
//! bucket `EXPIRE`s and the final `SCARD` in one `MULTI` block, so several
//! daemons can share the counters.

use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use warden_consumer::{ConsumerError, CursorStore};
use warden_counters::{distinct_key, system_clock, Clock, CountError, CountStore, Period};

pub struct RedisStore {
    conn: ConnectionManager,
    clock: Clock,
}

impl RedisStore {
    /// Connect and verify the server answers.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(url = %redact(url), "connected to redis");
        Ok(Self {
            conn,
            clock: system_clock(),
        })
    }
}

/// Build the atomic increment for one member.
fn increment_pipeline(namespace: &str, key: &str, member: &str, clock: &Clock) -> redis::Pipeline {
    let now = clock();
    let mut pipe = redis::pipe();
    pipe.atomic();
    for period in Period::ALL {
        let set = distinct_key(namespace, key, period, now);
        pipe.sadd(&set, member).ignore();
        if let Some(retention) = period.retention() {
            pipe.expire(&set, retention.num_seconds()).ignore();
        }
    }
    pipe.scard(distinct_key(namespace, key, Period::Total, now));
    pipe
}

fn cursor_key(stream: &str) -> String {
    format!("cursor/{}", stream)
}

/// Drop the password from a redis URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***{}", &url[..scheme], &url[at..]),
        _ => url.to_string(),
    }
}

#[async_trait]
impl CountStore for RedisStore {
    async fn increment_distinct(&self, namespace: &str, key: &str, member: &str) -> warden_counters::Result<u64> {
        let mut conn = self.conn.clone();
        let pipe = increment_pipeline(namespace, key, member, &self.clock);
        let (count,): (u64,) = pipe.query_async(&mut conn).await.map_err(CountError::backend)?;
        Ok(count)
    }

    async fn get_count_distinct(&self, namespace: &str, key: &str, period: Period) -> warden_counters::Result<u64> {
        let mut conn = self.conn.clone();
        let set = distinct_key(namespace, key, period, (self.clock)());
        conn.scard(set).await.map_err(CountError::backend)
    }
}

#[async_trait]
impl CursorStore for RedisStore {
    async fn load_cursor(&self, stream: &str) -> warden_consumer::Result<Option<u64>> {
        let mut conn = self.conn.clone();
        conn.get(cursor_key(stream))
            .await
            .map_err(|e| ConsumerError::Cursor(e.to_string()))
    }

    async fn save_cursor(&self, stream: &str, seq: u64) -> warden_consumer::Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(cursor_key(stream), seq)
            .await
            .map_err(|e| ConsumerError::Cursor(e.to_string()))
    }
}

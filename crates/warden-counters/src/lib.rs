//! Warden Distinct Counters
//!
//! A counter here is the cardinality of a set of contributing identities,
//! not a raw event count. Each `(namespace, key)` pair owns one member set
//! per [`Period`] bucket; adding a member that is already present changes
//! nothing.
//!
//! # Periods
//!
//! Every increment lands in three buckets at once:
//!
//! - `Total` - never resets
//! - `Day` - the current UTC day
//! - `Hour` - the current UTC hour
//!
//! # Backends
//!
//! [`MemCountStore`] lives in this crate and is process-local. Durable
//! backends (RocksDB, Redis) implement [`CountStore`] in the daemon. All of
//! them must give atomic set-add semantics: concurrent increments on one key
//! end at the true cardinality.

mod error;
mod memory;
mod period;

pub use error::{CountError, Result};
pub use memory::MemCountStore;
pub use period::{distinct_key, system_clock, Clock, Period};

use async_trait::async_trait;

/// Store of distinct-member counters.
#[async_trait]
pub trait CountStore: Send + Sync {
    /// Record that `member` asserted against `(namespace, key)` in every
    /// period bucket. Returns the `Total` cardinality after the add.
    async fn increment_distinct(&self, namespace: &str, key: &str, member: &str) -> Result<u64>;

    /// Number of distinct members seen in the current bucket of `period`.
    async fn get_count_distinct(&self, namespace: &str, key: &str, period: Period) -> Result<u64>;
}

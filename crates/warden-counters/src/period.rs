//! Time partitioning.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

/// Source of the current time. Injected so buckets can be tested.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Total,
    Day,
    Hour,
}

impl Period {
    /// Every period, in the order increments write them.
    pub const ALL: [Period; 3] = [Period::Total, Period::Day, Period::Hour];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Period::Total => "total",
            Period::Day => "day",
            Period::Hour => "hour",
        }
    }

    /// Bucket label for the window containing `at`.
    pub fn bucket(&self, at: DateTime<Utc>) -> String {
        match self {
            Period::Total => "total".to_string(),
            Period::Day => format!("day:{}", at.format("%Y-%m-%d")),
            Period::Hour => format!("hour:{}", at.format("%Y-%m-%dT%H")),
        }
    }

    /// When the window containing `at` closes. `Total` never closes.
    pub fn closes_at(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let width = match self {
            Period::Total => return None,
            Period::Day => DAY_SECS,
            Period::Hour => HOUR_SECS,
        };
        let end = (at.timestamp().div_euclid(width) + 1) * width;
        Utc.timestamp_opt(end, 0).single()
    }

    /// How long a shared store should keep a bucket around.
    pub fn retention(&self) -> Option<Duration> {
        match self {
            Period::Total => None,
            Period::Day => Some(Duration::days(2)),
            Period::Hour => Some(Duration::hours(2)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage key for one `(namespace, key)` member set in one bucket.
pub fn distinct_key(namespace: &str, key: &str, period: Period, at: DateTime<Utc>) -> String {
    format!("distinct/{}/{}/{}", period.bucket(at), namespace, key)
}

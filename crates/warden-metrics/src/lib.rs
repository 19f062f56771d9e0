//! Prometheus metrics for the warden daemon.
//!
//! # Metric Families
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `warden_events_total` | Counter | `stream`, `outcome` |
//! | `warden_votes_total` | Counter | `kind`, `outcome` |
//! | `warden_label_actions_total` | Counter | `label`, `action`, `result` |
//! | `warden_cursor` | Gauge | `stream` |
//! | `warden_cache_purges_total` | Counter | |
//!
//! Handles are cheap clones over shared atomics; pass them around freely.

pub use prometheus::Registry;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, TextEncoder};
use thiserror::Error;

/// Label values longer than this are cut, so a misconfigured label name
/// cannot blow up series cardinality.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Every warden metric, registered against one registry.
#[derive(Clone)]
pub struct WardenMetrics {
    events_total: IntCounterVec,
    votes_total: IntCounterVec,
    label_actions_total: IntCounterVec,
    cursor: IntGaugeVec,
    cache_purges_total: IntCounter,
}

impl WardenMetrics {
    /// Create and register all families.
    ///
    /// # Errors
    ///
    /// Fails if a family with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new("warden_events_total", "Stream events processed, by outcome"),
            &["stream", "outcome"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let votes_total = IntCounterVec::new(
            Opts::new("warden_votes_total", "Bot votes evaluated, by outcome"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(votes_total.clone()))?;

        let label_actions_total = IntCounterVec::new(
            Opts::new("warden_label_actions_total", "Label mutations requested"),
            &["label", "action", "result"],
        )?;
        registry.register(Box::new(label_actions_total.clone()))?;

        let cursor = IntGaugeVec::new(
            Opts::new("warden_cursor", "Last persisted stream cursor"),
            &["stream"],
        )?;
        registry.register(Box::new(cursor.clone()))?;

        let cache_purges_total = IntCounter::with_opts(Opts::new(
            "warden_cache_purges_total",
            "Account metadata purged after moderation events",
        ))?;
        registry.register(Box::new(cache_purges_total.clone()))?;

        Ok(Self {
            events_total,
            votes_total,
            label_actions_total,
            cursor,
            cache_purges_total,
        })
    }

    /// Metrics on a private registry, for tests and tools that never export.
    pub fn unregistered() -> Result<Self> {
        Self::new(&Registry::new())
    }

    pub fn event_processed(&self, stream: &str, outcome: &str) {
        self.events_total
            .with_label_values(&[truncate_label(stream), truncate_label(outcome)])
            .inc();
    }

    pub fn event_count(&self, stream: &str, outcome: &str) -> u64 {
        self.events_total
            .with_label_values(&[truncate_label(stream), truncate_label(outcome)])
            .get()
    }

    pub fn vote_evaluated(&self, kind: &str, outcome: &str) {
        self.votes_total.with_label_values(&[kind, outcome]).inc();
    }

    pub fn vote_count(&self, kind: &str, outcome: &str) -> u64 {
        self.votes_total.with_label_values(&[kind, outcome]).get()
    }

    /// `action` is `add` or `remove`; `result` is the change outcome or `error`.
    pub fn label_action(&self, label: &str, action: &str, result: &str) {
        self.label_actions_total
            .with_label_values(&[truncate_label(label), action, result])
            .inc();
    }

    pub fn label_action_count(&self, label: &str, action: &str, result: &str) -> u64 {
        self.label_actions_total
            .with_label_values(&[truncate_label(label), action, result])
            .get()
    }

    pub fn set_cursor(&self, stream: &str, seq: u64) {
        self.cursor
            .with_label_values(&[truncate_label(stream)])
            .set(i64::try_from(seq).unwrap_or(i64::MAX));
    }

    pub fn cursor(&self, stream: &str) -> i64 {
        self.cursor.with_label_values(&[truncate_label(stream)]).get()
    }

    pub fn cache_purged(&self) {
        self.cache_purges_total.inc();
    }

    pub fn cache_purge_count(&self) -> u64 {
        self.cache_purges_total.get()
    }
}

/// Registry plus the metrics registered on it.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    metrics: WardenMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = WardenMetrics::new(&registry)?;
        Ok(Self { registry, metrics })
    }

    pub fn metrics(&self) -> &WardenMetrics {
        &self.metrics
    }

    /// Prometheus text exposition of everything registered.
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX_LABEL_VALUE_LEN)
        .last()
        .unwrap_or(0);
    &value[..end]
}

//! Configuration for the warden daemon
//!
//! CLI arguments with environment variable fallbacks using clap. A `.env`
//! file in the working directory is loaded by `main` before parsing.

use crate::error::{Error, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use warden_consumer::{ConsumerConfig, Parallelism};
use warden_labels::{CacheConfig, OzoneConfig};
use warden_logging::LogFormat;
use warden_policy::{BotVoteConfig, FIREHOSE_STREAM, MODERATION_STREAM};
use warden_records::Did;

/// Where counters and cursors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Process-local; everything is lost on restart
    Memory,
    /// Embedded RocksDB under the data directory
    Rocksdb,
    /// Shared Redis instance
    Redis,
}

/// Warden - good bot / bad bot vote labeling
#[derive(Parser, Debug, Clone)]
#[command(name = "warden")]
#[command(about = "Counts good bot / bad bot votes and labels the accounts they name")]
#[command(version)]
pub struct Args {
    /// Record stream host (ws:// or wss://)
    #[arg(long, env = "ATP_RELAY_HOST", default_value = "wss://bsky.network")]
    pub relay_host: String,

    /// Moderation service base URL
    #[arg(long, env = "ATP_OZONE_HOST")]
    pub ozone_host: Option<String>,

    /// Account that label mutations are attributed to
    #[arg(long, env = "AUTOMOD_OZONE_DID")]
    pub ozone_did: Option<String>,

    /// Moderation service admin password. Without it the daemon only counts.
    #[arg(long, env = "AUTOMOD_OZONE_AUTH_ADMIN_TOKEN", hide_env_values = true)]
    pub ozone_admin_token: Option<String>,

    /// Rate-limit bypass secret sent with moderation requests
    #[arg(long, env = "AUTOMOD_RATELIMIT_BYPASS", hide_env_values = true)]
    pub ratelimit_bypass: Option<String>,

    /// Counter and cursor backend
    #[arg(long, env = "WARDEN_STORE", value_enum, default_value = "memory")]
    pub store: StoreBackend,

    /// Data directory (RocksDB files, default admin socket)
    #[arg(long, env = "WARDEN_DATA_DIR", default_value = "./warden-data")]
    pub data_dir: PathBuf,

    /// Redis URL, required with `--store redis`
    #[arg(long, env = "AUTOMOD_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Log level for warden crates (RUST_LOG overrides)
    #[arg(long, env = "AUTOMOD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: text or json
    #[arg(long, env = "WARDEN_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Firehose worker count, 0 = four per core
    #[arg(long, env = "AUTOMOD_FIREHOSE_PARALLELISM", default_value = "0")]
    pub firehose_parallelism: usize,

    /// Moderation stream worker count, 0 = four per core
    #[arg(long, env = "WARDEN_MODERATION_PARALLELISM", default_value = "1")]
    pub moderation_parallelism: usize,

    /// Seconds between cursor saves
    #[arg(long, env = "WARDEN_CURSOR_PERSIST_SECS", default_value = "5")]
    pub cursor_persist_secs: u64,

    /// Seconds between moderation event polls once caught up
    #[arg(long, env = "WARDEN_MODERATION_POLL_SECS", default_value = "5")]
    pub moderation_poll_secs: u64,

    /// Distinct voters needed for the good-bot label
    #[arg(long, env = "WARDEN_GOOD_BOT_THRESHOLD", default_value = "2")]
    pub good_bot_threshold: u64,

    /// Distinct voters needed for the bad-bot label
    #[arg(long, env = "WARDEN_BAD_BOT_THRESHOLD", default_value = "2")]
    pub bad_bot_threshold: u64,

    /// Voters with this label apply labels on their own
    #[arg(long, env = "WARDEN_OVERRIDE_LABEL", default_value = "bladerunner")]
    pub override_label: String,

    /// Voters with any of these labels are ignored (comma separated)
    #[arg(
        long,
        env = "WARDEN_DISQUALIFYING_LABELS",
        value_delimiter = ',',
        default_value = "jabroni,bad-bot"
    )]
    pub disqualifying_labels: Vec<String>,

    /// Seconds an account lookup stays cached
    #[arg(long, env = "WARDEN_CACHE_TTL_SECS", default_value = "3600")]
    pub cache_ttl_secs: u64,

    /// Maximum cached accounts
    #[arg(long, env = "WARDEN_CACHE_MAX_ENTRIES", default_value = "50000")]
    pub cache_max_entries: usize,

    /// HTTP listen address (metrics, health, inspection)
    #[arg(long, env = "AUTOMOD_METRICS_LISTEN", default_value = "0.0.0.0:3989")]
    pub listen: SocketAddr,

    /// Admin socket path (default: <data-dir>/admin.sock)
    #[arg(long, env = "WARDEN_ADMIN_SOCKET")]
    pub admin_socket: Option<PathBuf>,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.ozone_host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err("ATP_OZONE_HOST is required for account lookups".to_string());
        }

        if self.store == StoreBackend::Redis && self.redis_url.is_none() {
            return Err("AUTOMOD_REDIS_URL is required with the redis store".to_string());
        }

        if self.ozone_admin_token.is_some() && self.ozone_did.is_none() {
            return Err("AUTOMOD_OZONE_DID is required when an admin token is set".to_string());
        }

        if let Some(did) = &self.ozone_did {
            Did::parse(did).map_err(|e| format!("AUTOMOD_OZONE_DID: {}", e))?;
        }

        if !self.relay_host.starts_with("ws://") && !self.relay_host.starts_with("wss://") {
            return Err("ATP_RELAY_HOST must be a ws:// or wss:// URL".to_string());
        }

        if self.cursor_persist_secs == 0 || self.moderation_poll_secs == 0 {
            return Err("intervals must be at least one second".to_string());
        }

        self.policy_config().validate().map_err(|e| e.to_string())?;

        Ok(())
    }

    pub fn policy_config(&self) -> BotVoteConfig {
        BotVoteConfig {
            good_bot_threshold: self.good_bot_threshold,
            bad_bot_threshold: self.bad_bot_threshold,
            disqualifying_labels: self
                .disqualifying_labels
                .iter()
                .map(|l| l.trim().to_string())
                .collect(),
            override_label: self.override_label.trim().to_string(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            max_entries: self.cache_max_entries,
        }
    }

    pub fn ozone_config(&self) -> Result<OzoneConfig> {
        let host = self
            .ozone_host
            .as_deref()
            .ok_or_else(|| Error::Config("ozone host is not set".to_string()))?;
        let mut config = OzoneConfig::new(host);
        config.admin_token = self.ozone_admin_token.clone();
        config.ratelimit_bypass = self.ratelimit_bypass.clone();
        Ok(config)
    }

    /// Operator identity for label mutations; `None` runs read-only.
    pub fn operator(&self) -> Result<Option<Did>> {
        if self.ozone_admin_token.is_none() {
            return Ok(None);
        }
        self.ozone_did
            .as_deref()
            .map(|did| Did::parse(did).map_err(|e| Error::Config(e.to_string())))
            .transpose()
    }

    pub fn admin_socket_path(&self) -> PathBuf {
        self.admin_socket
            .clone()
            .unwrap_or_else(|| self.data_dir.join("admin.sock"))
    }

    pub fn firehose_consumer(&self) -> ConsumerConfig {
        ConsumerConfig::new(FIREHOSE_STREAM)
            .with_parallelism(Parallelism::from_count(self.firehose_parallelism))
            .with_persist_interval(Duration::from_secs(self.cursor_persist_secs))
    }

    pub fn moderation_consumer(&self) -> ConsumerConfig {
        ConsumerConfig::new(MODERATION_STREAM)
            .with_parallelism(Parallelism::from_count(self.moderation_parallelism))
            .with_persist_interval(Duration::from_secs(self.cursor_persist_secs))
    }

    pub fn moderation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.moderation_poll_secs)
    }
}

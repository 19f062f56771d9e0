//! Warden Daemon
//!
//! Runs the good-bot / bad-bot labeling pipelines as a long-lived service.
//!
//! # Architecture
//!
//! - **Config**: clap arguments with environment fallbacks
//! - **Storage**: RocksDB and Redis implementations of the counter and cursor stores
//! - **Moderation**: event feed poller over the moderation service
//! - **Node**: wiring, task supervision and graceful shutdown
//! - **API**: `/health`, `/ready`, `/metrics` and read-only inspection
//! - **Admin Socket**: Unix socket for local admin commands (warden-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use warden_daemon::{Args, WardenNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let args = Args::parse();
//!     let node = WardenNode::new(args).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod config;
pub mod error;
pub mod moderation;
pub mod node;
pub mod redis_store;
pub mod storage;

pub use config::{Args, StoreBackend};
pub use error::{Error, Result};
pub use node::{open_stores, DaemonState, Stores, WardenNode};
pub use redis_store::RedisStore;
pub use storage::Storage;

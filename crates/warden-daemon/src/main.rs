//! Warden daemon binary.

use clap::Parser;
use warden_daemon::{Args, WardenNode};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    if let Err(e) = warden_logging::init(&args.log_level, args.log_format) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = args.validate() {
        tracing::error!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting warden");

    let node = match WardenNode::new(args).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = node.run().await {
        tracing::error!(error = %e, "warden exited with error");
        std::process::exit(1);
    }
}

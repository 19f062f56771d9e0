//! Unix socket server for admin commands.
//!
//! Newline-delimited JSON, one response per command. Used by the
//! `warden-admin` CLI to inspect cursors and counts and to drop cached
//! account metadata.

use crate::api::{counts_for, is_known_stream, SubjectCounts};
use crate::error::Result;
use crate::node::DaemonState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use warden_consumer::CursorStore;
use warden_records::Did;

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Ping (health check)
    Ping,
    /// Persisted cursor of a stream
    GetCursor { stream: String },
    /// Vote counts against an account
    GetCounts { subject: String },
    /// Drop cached metadata for an account
    PurgeAccount { did: String },
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Cursor { stream: String, cursor: Option<u64> },
    Counts(SubjectCounts),
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
    listener: UnixListener,
}

impl AdminSocket {
    /// Bind the socket, replacing a stale file left by an unclean exit.
    pub fn bind(state: Arc<DaemonState>, socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!(path = %socket_path.display(), "admin socket listening");
        Ok(Self {
            state,
            socket_path,
            listener,
        })
    }

    /// Serve until `shutdown` fires, then remove the socket file.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state).await {
                                tracing::error!(error = %e, "admin connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept admin connection");
                    }
                },
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

pub async fn execute_command(cmd: AdminCommand, state: &DaemonState) -> AdminResponse {
    match cmd {
        AdminCommand::Ping => AdminResponse::Pong,

        AdminCommand::GetCursor { stream } => {
            if !is_known_stream(&stream) {
                return AdminResponse::Error {
                    error: format!("Unknown stream: {}", stream),
                };
            }
            match state.cursors.load_cursor(&stream).await {
                Ok(cursor) => AdminResponse::Cursor { stream, cursor },
                Err(e) => AdminResponse::Error { error: e.to_string() },
            }
        }

        AdminCommand::GetCounts { subject } => {
            let subject = match Did::parse(&subject) {
                Ok(did) => did,
                Err(e) => return AdminResponse::Error { error: e.to_string() },
            };
            match counts_for(state.counters.as_ref(), &subject).await {
                Ok(counts) => AdminResponse::Counts(counts),
                Err(e) => AdminResponse::Error { error: e.to_string() },
            }
        }

        AdminCommand::PurgeAccount { did } => {
            let did = match Did::parse(&did) {
                Ok(did) => did,
                Err(e) => return AdminResponse::Error { error: e.to_string() },
            };
            let purged = state.accounts.purge(&did);
            if purged {
                state.metrics.metrics().cache_purged();
            }
            tracing::info!(did = %did, purged, "admin purge");
            AdminResponse::Ok {
                message: if purged {
                    format!("Purged cached metadata for {}", did)
                } else {
                    format!("No cached metadata for {}", did)
                },
            }
        }
    }
}

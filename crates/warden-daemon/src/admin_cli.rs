//! warden-admin CLI tool
//!
//! Talks to a running warden daemon over its admin socket.
//!
//! Usage:
//!   warden-admin ping
//!   warden-admin cursor <stream>
//!   warden-admin counts <did>
//!   warden-admin purge <did>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Ping,
    GetCursor { stream: String },
    GetCounts { subject: String },
    PurgeAccount { did: String },
}

#[derive(Debug, Deserialize)]
struct PeriodCounts {
    total: u64,
    day: u64,
    hour: u64,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok {
        message: String,
    },
    Error {
        error: String,
    },
    Cursor {
        stream: String,
        cursor: Option<u64>,
    },
    Counts {
        subject: String,
        counts: BTreeMap<String, PeriodCounts>,
    },
    Pong,
}

fn print_usage() {
    eprintln!("warden-admin - Inspect and manage a running warden daemon");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  warden-admin ping              Check if daemon is running");
    eprintln!("  warden-admin cursor <stream>   Persisted cursor (firehose, moderation)");
    eprintln!("  warden-admin counts <did>      Vote counts against an account");
    eprintln!("  warden-admin purge <did>       Drop cached metadata for an account");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WARDEN_ADMIN_SOCKET  Path to admin socket (default: ./warden-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("WARDEN_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./warden-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to warden at {:?}: {}\n\
             Is the daemon running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn required_arg(args: &[String], command: &str, name: &str) -> String {
    match args.get(2) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a {} argument", command, name);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "ping" => AdminCommand::Ping,
        "cursor" => AdminCommand::GetCursor {
            stream: required_arg(&args, "cursor", "stream"),
        },
        "counts" => AdminCommand::GetCounts {
            subject: required_arg(&args, "counts", "did"),
        },
        "purge" => AdminCommand::PurgeAccount {
            did: required_arg(&args, "purge", "did"),
        },
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Cursor { stream, cursor } => match cursor {
                Some(seq) => println!("{} {}", stream, seq),
                None => println!("{} (none)", stream),
            },
            AdminResponse::Counts { subject, counts } => {
                println!("{}", subject);
                println!("  {:<10} {:>8} {:>8} {:>8}", "kind", "total", "day", "hour");
                for (kind, c) in counts {
                    println!("  {:<10} {:>8} {:>8} {:>8}", kind, c.total, c.day, c.hour);
                }
            }
            AdminResponse::Pong => {
                println!("pong - warden is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

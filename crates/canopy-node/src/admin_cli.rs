//! canopy-admin CLI tool
//!
//! Inspects and repairs the referral tree held by a running canopy-node.
//!
//! Usage:
//!   canopy-admin stats
//!   canopy-admin find-orphans
//!   canopy-admin relink-orphans
//!   canopy-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Stats,
    FindOrphans,
    RelinkOrphans,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Error { error: String },
    List { items: Vec<String> },
    Stats { nodes: usize, serial: u64 },
    Repair { relinked: Vec<String>, unresolved: Vec<String> },
    Pong,
}

fn print_usage() {
    eprintln!("canopy-admin - Inspect and repair a Canopy referral tree");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  canopy-admin stats            Node count and last issued serial");
    eprintln!("  canopy-admin find-orphans     List nodes no parent links to");
    eprintln!("  canopy-admin relink-orphans   Link orphans into open parent slots");
    eprintln!("  canopy-admin ping             Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CANOPY_SOCKET  Path to admin socket (default: ./canopy-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("CANOPY_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./canopy-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to canopy-node at {:?}: {}\n\
             Is the canopy-node running?",
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

fn print_codes(items: &[String]) {
    if items.is_empty() {
        println!("(none)");
    } else {
        for item in items {
            println!("{}", item);
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
        "stats" => AdminCommand::Stats,
        "find-orphans" => AdminCommand::FindOrphans,
        "relink-orphans" => AdminCommand::RelinkOrphans,
        "ping" => AdminCommand::Ping,
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
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::List { items } => print_codes(&items),
            AdminResponse::Stats { nodes, serial } => {
                println!("nodes:  {}", nodes);
                println!("serial: {}", serial);
            }
            AdminResponse::Repair { relinked, unresolved } => {
                println!("relinked:");
                print_codes(&relinked);
                println!("unresolved:");
                print_codes(&unresolved);
                if !unresolved.is_empty() {
                    std::process::exit(1);
                }
            }
            AdminResponse::Pong => {
                println!("pong - canopy-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

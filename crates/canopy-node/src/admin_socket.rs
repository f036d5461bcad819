//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for inspecting and repairing the tree.

use crate::error::Result;
use crate::storage::Storage;
use canopy_tree::{find_orphans, relink_orphans, COUNTER_NAME};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Node count and counter value
    Stats,
    /// List children persisted without a parent link
    FindOrphans,
    /// Link orphans back into open parent slots
    RelinkOrphans,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Error { error: String },
    List { items: Vec<String> },
    Stats { nodes: usize, serial: u64 },
    Repair { relinked: Vec<String>, unresolved: Vec<String> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    storage: Arc<Storage>,
    socket_path: PathBuf,
    placement_lock: Arc<Mutex<()>>,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(storage: Arc<Storage>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            socket_path: socket_path.into(),
            placement_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share the API's placement lock so repairs never interleave with placements.
    pub fn with_placement_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.placement_lock = lock;
        self
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let storage = Arc::clone(&self.storage);
                    let lock = Arc::clone(&self.placement_lock);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, storage, lock).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }
}

async fn handle_connection(
    stream: UnixStream,
    storage: Arc<Storage>,
    placement_lock: Arc<Mutex<()>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &storage, &placement_lock).await,
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

pub(crate) async fn execute_command(
    cmd: AdminCommand,
    storage: &Storage,
    placement_lock: &Mutex<()>,
) -> AdminResponse {
    match cmd {
        AdminCommand::Stats => {
            let stats = storage
                .count_nodes()
                .and_then(|nodes| Ok((nodes, storage.get_serial(COUNTER_NAME)?)));
            match stats {
                Ok((nodes, serial)) => AdminResponse::Stats { nodes, serial },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }

        AdminCommand::FindOrphans => match find_orphans(storage) {
            Ok(orphans) => AdminResponse::List {
                items: orphans.into_iter().map(|n| n.code).collect(),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::RelinkOrphans => {
            let _guard = placement_lock.lock().await;
            match relink_orphans(storage) {
                Ok(report) => {
                    tracing::info!(
                        relinked = report.relinked.len(),
                        unresolved = report.unresolved.len(),
                        "Relinked orphans"
                    );
                    AdminResponse::Repair {
                        relinked: report.relinked,
                        unresolved: report.unresolved,
                    }
                }
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

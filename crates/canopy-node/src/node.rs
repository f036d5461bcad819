//! Canopy Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API for clients (policyholder creation and tree queries)
//! - Unix admin socket for local maintenance (canopy-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::storage::Storage;
use canopy_tree::{CodeFormat, DEFAULT_CODE_WIDTH, DEFAULT_VIEW_DEPTH};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Configuration for a Canopy node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for canopy-admin CLI)
    pub admin_socket: PathBuf,

    /// Zero-padding width of policyholder codes
    pub code_width: usize,

    /// Generations shown below the queried node
    pub view_depth: usize,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(
            lookup("CANOPY_DATA_DIR").unwrap_or_else(|| "./canopy-data".to_string()),
        );

        let api_addr = lookup("CANOPY_API_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("invalid CANOPY_API_ADDR: {}", e)))?;

        let admin_socket = lookup("CANOPY_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let code_width = parse_number(&lookup, "CANOPY_CODE_WIDTH", DEFAULT_CODE_WIDTH)?;
        if !(1..=CodeFormat::MAX_WIDTH).contains(&code_width) {
            return Err(Error::Config(format!(
                "CANOPY_CODE_WIDTH must be between 1 and {}, got {}",
                CodeFormat::MAX_WIDTH,
                code_width
            )));
        }

        let view_depth = parse_number(&lookup, "CANOPY_VIEW_DEPTH", DEFAULT_VIEW_DEPTH)?;

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            code_width,
            view_depth,
        })
    }

    /// Code format derived from the configured width.
    pub fn code_format(&self) -> CodeFormat {
        CodeFormat::new(self.code_width)
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid {}: {:?}", key, raw))),
        None => Ok(default),
    }
}

/// Shared state for the node - single storage instance shared by all components.
pub struct NodeState {
    pub storage: Arc<Storage>,
    pub config: NodeConfig,
    /// Held across a whole placement walk so in-process placements never race.
    pub placement_lock: Arc<Mutex<()>>,
}

impl NodeState {
    pub fn new(storage: Arc<Storage>, config: NodeConfig) -> Self {
        Self {
            storage,
            config,
            placement_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// A Canopy node instance.
pub struct CanopyNode {
    state: Arc<NodeState>,
    config: NodeConfig,
}

impl CanopyNode {
    /// Create a new node, opening storage under the data directory.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(config.data_dir.join("db"))?);
        let state = Arc::new(NodeState::new(storage, config.clone()));

        Ok(Self { state, config })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Canopy node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Code width: {}", self.config.code_width);

        let admin_socket = AdminSocket::new(
            Arc::clone(&self.state.storage),
            self.config.admin_socket.clone(),
        )
        .with_placement_lock(Arc::clone(&self.state.placement_lock));
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

//! Canopy Node - Referral Tree Service
//!
//! Hosts a weight-balanced policyholder referral tree behind an HTTP API.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed implementation of [`canopy_tree::NodeStore`]
//! - **API**: HTTP endpoints for placing policyholders and fetching trees
//! - **Admin Socket**: Unix socket for local maintenance (canopy-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use canopy_node::{CanopyNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = CanopyNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;
pub mod storage;

pub use error::{Error, Result};
pub use node::{CanopyNode, NodeConfig, NodeState};
pub use storage::Storage;

//! Canopy Node binary
//!
//! Serves the policyholder referral tree over HTTP.

use canopy_node::{CanopyNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canopy_node=info,canopy_tree=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Canopy Node");

    let config = NodeConfig::from_env()?;

    let node = CanopyNode::new(config).await?;
    node.run().await?;

    Ok(())
}

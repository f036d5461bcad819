//! Error types for tree operations.

use thiserror::Error;

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Failure reported by a storage collaborator, including timeouts.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that can occur in placement and reconstruction.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A root already exists
    #[error("root has been created")]
    RootAlreadyExists,

    /// No node carries the introducer code
    #[error("introducer not found: {0}")]
    IntroducerNotFound(String),

    /// No node carries the requested code
    #[error("policyholder not found: {0}")]
    NodeNotFound(String),

    /// The node has no structural parent
    #[error("node is root: {0}")]
    NodeIsRoot(String),

    /// The store failed or timed out
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Links or paths in the store contradict each other
    #[error("corrupt tree: {0}")]
    CorruptTree(String),
}

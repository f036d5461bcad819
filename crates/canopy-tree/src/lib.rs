//! Canopy Tree - weight-balanced referral tree
//!
//! Places new policyholders into a binary referral tree and answers
//! depth-bounded structural queries against it.
//!
//! # Architecture
//!
//! - **Path**: codec for the `/`-delimited ancestry path carried by every node
//! - **Store**: the [`NodeStore`] collaborator trait and an in-memory arena
//! - **Placement**: walks down from an introducer, always entering the lighter
//!   subtree, until it finds an open slot
//! - **View**: reassembles a nested [`TreeView`] from one bulk read
//! - **Repair**: finds children that were persisted but never linked
//!
//! # Example
//!
//! ```
//! use canopy_tree::{CodeFormat, MemoryStore, PlacementEngine, TreeReader};
//!
//! let store = MemoryStore::new();
//! let placement = PlacementEngine::new(&store, CodeFormat::default());
//! let root = placement.place_root("Root").unwrap();
//! placement.place_node(&root.code, "First").unwrap();
//!
//! let view = TreeReader::new(&store).subtree(&root.code, 3).unwrap();
//! assert_eq!(view.len(), 2);
//! ```

pub mod error;
pub mod model;
pub mod path;
pub mod placement;
pub mod repair;
pub mod store;
pub mod view;

pub use error::{Result, StoreError, TreeError};
pub use model::{CodeFormat, Node, NodeId, Side, TreeView};
pub use path::{descendant_pattern, PathPattern};
pub use placement::PlacementEngine;
pub use repair::{find_orphans, relink_orphans, RepairReport};
pub use store::{MemoryStore, NodeStore, StoreResult};
pub use view::TreeReader;

/// Name of the counter that issues policyholder codes.
pub const COUNTER_NAME: &str = "policyholder";

/// Default zero-padding width of codes.
pub const DEFAULT_CODE_WIDTH: usize = 10;

/// Default number of generations shown below the queried node.
pub const DEFAULT_VIEW_DEPTH: usize = 3;

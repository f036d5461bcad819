//! Storage collaborator.
//!
//! The engines never hold nodes between calls; every read and write goes
//! through [`NodeStore`]. Implementations must make `save_node` atomic for a
//! single node and `next_serial` atomic across concurrent callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::model::{Node, NodeId};
use crate::path::PathPattern;

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistent storage for nodes and named counters.
pub trait NodeStore: Send + Sync {
    /// Look a node up by its code.
    fn find_node_by_code(&self, code: &str) -> StoreResult<Option<Node>>;

    /// Look a node up by its store identity.
    fn find_node_by_id(&self, id: &NodeId) -> StoreResult<Option<Node>>;

    /// Any node at all; used as an existence check.
    fn find_any_node(&self) -> StoreResult<Option<Node>>;

    /// All nodes whose ancestry path matches `pattern`.
    fn find_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<Vec<Node>>;

    /// Count of nodes whose ancestry path matches `pattern`.
    fn count_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<usize>;

    /// Insert or update a node by id.
    fn save_node(&self, node: &Node) -> StoreResult<()>;

    /// Increment the named counter and return the new value.
    fn next_serial(&self, counter: &str) -> StoreResult<u64>;
}

macro_rules! forward_store {
    ($($ty:ty),*) => {$(
        impl<T: NodeStore + ?Sized> NodeStore for $ty {
            fn find_node_by_code(&self, code: &str) -> StoreResult<Option<Node>> {
                (**self).find_node_by_code(code)
            }
            fn find_node_by_id(&self, id: &NodeId) -> StoreResult<Option<Node>> {
                (**self).find_node_by_id(id)
            }
            fn find_any_node(&self) -> StoreResult<Option<Node>> {
                (**self).find_any_node()
            }
            fn find_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<Vec<Node>> {
                (**self).find_nodes_matching(pattern)
            }
            fn count_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<usize> {
                (**self).count_nodes_matching(pattern)
            }
            fn save_node(&self, node: &Node) -> StoreResult<()> {
                (**self).save_node(node)
            }
            fn next_serial(&self, counter: &str) -> StoreResult<u64> {
                (**self).next_serial(counter)
            }
        }
    )*};
}

forward_store!(&T, Arc<T>, Box<T>);

#[derive(Debug, Default)]
struct Tables {
    nodes: HashMap<NodeId, Node>,
    by_code: HashMap<String, NodeId>,
    counters: HashMap<String, u64>,
}

/// In-memory store: an arena of nodes keyed by id, with a code index.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.nodes.len())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::new("memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::new("memory store lock poisoned"))
    }
}

impl NodeStore for MemoryStore {
    fn find_node_by_code(&self, code: &str) -> StoreResult<Option<Node>> {
        let tables = self.read()?;
        Ok(tables
            .by_code
            .get(code)
            .and_then(|id| tables.nodes.get(id))
            .cloned())
    }

    fn find_node_by_id(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    fn find_any_node(&self) -> StoreResult<Option<Node>> {
        Ok(self.read()?.nodes.values().next().cloned())
    }

    fn find_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<Vec<Node>> {
        let tables = self.read()?;
        let mut nodes: Vec<Node> = tables
            .nodes
            .values()
            .filter(|n| pattern.matches(&n.ancestry_path))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(nodes)
    }

    fn count_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<usize> {
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|n| pattern.matches(&n.ancestry_path))
            .count())
    }

    fn save_node(&self, node: &Node) -> StoreResult<()> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.by_code.get(&node.code) {
            if *existing != node.id {
                return Err(StoreError::new(format!(
                    "duplicate code {} for id {}",
                    node.code, node.id
                )));
            }
        }
        tables.by_code.insert(node.code.clone(), node.id.clone());
        tables.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn next_serial(&self, counter: &str) -> StoreResult<u64> {
        let mut tables = self.write()?;
        let serial = tables.counters.entry(counter.to_string()).or_insert(0);
        *serial += 1;
        Ok(*serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::descendant_pattern;
    use chrono::Utc;

    #[test]
    fn counter_is_monotonic_per_name() {
        let store = MemoryStore::new();
        assert_eq!(store.next_serial("policyholder").unwrap(), 1);
        assert_eq!(store.next_serial("policyholder").unwrap(), 2);
        assert_eq!(store.next_serial("other").unwrap(), 1);
    }

    #[test]
    fn save_then_find() {
        let store = MemoryStore::new();
        let root = Node::root("01".into(), "Root".into(), Utc::now());
        store.save_node(&root).unwrap();

        assert_eq!(store.find_node_by_code("01").unwrap(), Some(root.clone()));
        assert_eq!(store.find_node_by_id(&root.id).unwrap(), Some(root.clone()));
        assert!(store.find_any_node().unwrap().is_some());
        assert!(store.find_node_by_code("02").unwrap().is_none());
    }

    #[test]
    fn save_is_upsert() {
        let store = MemoryStore::new();
        let mut root = Node::root("01".into(), "Root".into(), Utc::now());
        store.save_node(&root).unwrap();
        root.link(crate::Side::Left, NodeId::new("x"));
        store.save_node(&root).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let loaded = store.find_node_by_code("01").unwrap().unwrap();
        assert_eq!(loaded.left, Some(NodeId::new("x")));
    }

    #[test]
    fn duplicate_code_rejected() {
        let store = MemoryStore::new();
        let a = Node::root("01".into(), "A".into(), Utc::now());
        let mut b = a.clone();
        b.id = NodeId::new("other");
        store.save_node(&a).unwrap();
        assert!(store.save_node(&b).is_err());
    }

    #[test]
    fn pattern_queries() {
        let store = MemoryStore::new();
        let root = Node::root("01".into(), "Root".into(), Utc::now());
        let child = Node::child_of(&root, "02".into(), "C".into(), "01".into(), Utc::now());
        let grandchild = Node::child_of(&child, "03".into(), "G".into(), "01".into(), Utc::now());
        for n in [&root, &child, &grandchild] {
            store.save_node(n).unwrap();
        }

        let p = descendant_pattern("01", Some(0));
        assert_eq!(store.count_nodes_matching(&p).unwrap(), 1);
        let p = descendant_pattern("01", None);
        let codes: Vec<_> = store
            .find_nodes_matching(&p)
            .unwrap()
            .into_iter()
            .map(|n| n.code)
            .collect();
        assert_eq!(codes, vec!["02", "03"]);
    }

    #[test]
    fn poisoned_lock_is_a_store_error() {
        let store = MemoryStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _tables = store.tables.write().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(store.len().is_err());
        assert!(store.find_any_node().is_err());
        assert!(store.next_serial("policyholder").is_err());
    }

    #[test]
    fn shared_through_arc() {
        let store = Arc::new(MemoryStore::new());
        let shared: &dyn NodeStore = &store;
        assert_eq!(shared.next_serial("c").unwrap(), 1);
        assert_eq!(store.next_serial("c").unwrap(), 2);
    }
}

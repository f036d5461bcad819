//! Persistent storage using RocksDB.
//!
//! Key layout:
//!
//! - `holder:{id}` → JSON [`Node`]
//! - `code:{code}` → id
//! - `counter:{name}` → decimal serial

use crate::error::{Error, Result};
use canopy_tree::{Node, NodeId, NodeStore, PathPattern, StoreError, StoreResult};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;

const HOLDER_PREFIX: &[u8] = b"holder:";

/// Storage backend for policyholder data.
pub struct Storage {
    db: DB,
    /// Serialises counter read-modify-write.
    counter_lock: Mutex<()>,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            counter_lock: Mutex::new(()),
        })
    }

    // --- Nodes ---

    /// Store a node and its code index in one batch.
    pub fn put_node(&self, node: &Node) -> Result<()> {
        if let Some(existing) = self.get_id_for_code(&node.code)? {
            if existing != node.id {
                return Err(Error::Storage(format!(
                    "code {} already belongs to {}",
                    node.code, existing
                )));
            }
        }

        let mut batch = WriteBatch::default();
        batch.put(holder_key(&node.id), serde_json::to_vec(node)?);
        batch.put(code_key(&node.code), node.id.as_str().as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        match self.db.get(holder_key(id))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Get a node by code.
    pub fn get_node_by_code(&self, code: &str) -> Result<Option<Node>> {
        match self.get_id_for_code(code)? {
            Some(id) => self.get_node(&id),
            None => Ok(None),
        }
    }

    fn get_id_for_code(&self, code: &str) -> Result<Option<NodeId>> {
        match self.db.get(code_key(code))? {
            Some(data) => {
                let id = String::from_utf8(data)
                    .map_err(|_| Error::Storage(format!("invalid id stored for code {}", code)))?;
                Ok(Some(NodeId::new(id)))
            }
            None => Ok(None),
        }
    }

    /// First node in key order, if any.
    pub fn first_node(&self) -> Result<Option<Node>> {
        let mut iter = self.db.prefix_iterator(HOLDER_PREFIX);
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.starts_with(HOLDER_PREFIX) {
                    Ok(Some(serde_json::from_slice(&value)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Visit every stored node.
    fn for_each_node<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Node),
    {
        let iter = self.db.prefix_iterator(HOLDER_PREFIX);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(HOLDER_PREFIX) {
                f(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }
        Ok(())
    }

    /// List nodes whose ancestry path matches a pattern, in code order.
    pub fn list_matching(&self, pattern: &PathPattern) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        self.for_each_node(|node| {
            if pattern.matches(&node.ancestry_path) {
                nodes.push(node);
            }
        })?;
        nodes.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(nodes)
    }

    /// Count nodes whose ancestry path matches a pattern.
    pub fn count_matching(&self, pattern: &PathPattern) -> Result<usize> {
        let mut count = 0;
        self.for_each_node(|node| {
            if pattern.matches(&node.ancestry_path) {
                count += 1;
            }
        })?;
        Ok(count)
    }

    /// Total number of stored nodes.
    pub fn count_nodes(&self) -> Result<usize> {
        let mut count = 0;
        self.for_each_node(|_| count += 1)?;
        Ok(count)
    }

    // --- Counters ---

    /// Current value of a counter without incrementing it.
    pub fn get_serial(&self, name: &str) -> Result<u64> {
        match self.db.get(counter_key(name))? {
            Some(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Storage(format!("invalid serial for counter {}", name))),
            None => Ok(0),
        }
    }

    /// Increment a counter and return the new value.
    pub fn increment_serial(&self, name: &str) -> Result<u64> {
        let _guard = self
            .counter_lock
            .lock()
            .map_err(|_| Error::Storage("counter lock poisoned".into()))?;
        let serial = self.get_serial(name)? + 1;
        self.db.put(counter_key(name), serial.to_string().as_bytes())?;
        Ok(serial)
    }
}

fn holder_key(id: &NodeId) -> Vec<u8> {
    format!("holder:{}", id).into_bytes()
}

fn code_key(code: &str) -> Vec<u8> {
    format!("code:{}", code).into_bytes()
}

fn counter_key(name: &str) -> Vec<u8> {
    format!("counter:{}", name).into_bytes()
}

impl From<Error> for StoreError {
    fn from(e: Error) -> Self {
        StoreError::new(e.to_string())
    }
}

impl NodeStore for Storage {
    fn find_node_by_code(&self, code: &str) -> StoreResult<Option<Node>> {
        Ok(self.get_node_by_code(code)?)
    }

    fn find_node_by_id(&self, id: &NodeId) -> StoreResult<Option<Node>> {
        Ok(self.get_node(id)?)
    }

    fn find_any_node(&self) -> StoreResult<Option<Node>> {
        Ok(self.first_node()?)
    }

    fn find_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<Vec<Node>> {
        Ok(self.list_matching(pattern)?)
    }

    fn count_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<usize> {
        Ok(self.count_matching(pattern)?)
    }

    fn save_node(&self, node: &Node) -> StoreResult<()> {
        Ok(self.put_node(node)?)
    }

    fn next_serial(&self, counter: &str) -> StoreResult<u64> {
        Ok(self.increment_serial(counter)?)
    }
}

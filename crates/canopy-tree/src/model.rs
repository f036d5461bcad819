//! Policyholder records and the views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// Store identity of a node.
///
/// Distinct from the externally visible code. Left/right links hold ids,
/// never owned nodes, so a dangling or cyclic link is only ever a failed
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a code and its registration instant (Blake3, hex).
    pub fn generate(code: &str, registered_at: DateTime<Utc>) -> Self {
        let nanos = registered_at.timestamp_nanos_opt().unwrap_or_default();
        let content = format!("{}:{}", code, nanos);
        let hash = blake3::hash(content.as_bytes());
        Self(hex::encode(&hash.as_bytes()[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two child slots of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// A policyholder in the referral tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Store identity
    pub id: NodeId,

    /// Fixed-width, zero-padded decimal code
    pub code: String,

    /// Display name
    pub name: String,

    /// Creation time
    #[serde(rename = "registration_date")]
    pub registered_at: DateTime<Utc>,

    /// Code of the member who introduced this node (empty for the root)
    #[serde(default)]
    pub introducer_code: String,

    /// Left child link
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub left: Option<NodeId>,

    /// Right child link
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub right: Option<NodeId>,

    /// Ancestor codes from the root down to the structural parent
    #[serde(rename = "parents", default)]
    pub ancestry_path: String,
}

impl Node {
    /// Build the root node.
    pub fn root(code: String, name: String, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: NodeId::generate(&code, registered_at),
            code,
            name,
            registered_at,
            introducer_code: String::new(),
            left: None,
            right: None,
            ancestry_path: String::new(),
        }
    }

    /// Build a node that fills an open slot of `parent`.
    pub fn child_of(
        parent: &Node,
        code: String,
        name: String,
        introducer_code: String,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NodeId::generate(&code, registered_at),
            code,
            name,
            registered_at,
            introducer_code,
            left: None,
            right: None,
            ancestry_path: parent.lineage(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.ancestry_path.is_empty()
    }

    /// This node's path extended with its own code: the path its children carry.
    pub fn lineage(&self) -> String {
        path::append_segment(&self.ancestry_path, &self.code)
    }

    /// Code of the structural parent, read from the ancestry path.
    pub fn parent_code(&self) -> Option<&str> {
        path::last_segment(&self.ancestry_path)
    }

    /// The link held in a slot.
    pub fn child(&self, side: Side) -> Option<&NodeId> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// The first open slot, left before right.
    pub fn open_slot(&self) -> Option<Side> {
        if self.left.is_none() {
            Some(Side::Left)
        } else if self.right.is_none() {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Point a slot at a child.
    pub fn link(&mut self, side: Side, child: NodeId) {
        match side {
            Side::Left => self.left = Some(child),
            Side::Right => self.right = Some(child),
        }
    }

    /// Which slot, if any, links to `id`.
    pub fn side_of(&self, id: &NodeId) -> Option<Side> {
        if self.left.as_ref() == Some(id) {
            Some(Side::Left)
        } else if self.right.as_ref() == Some(id) {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// Nested, depth-bounded projection of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeView {
    pub code: String,
    pub name: String,
    #[serde(rename = "registration_date")]
    pub registered_at: DateTime<Utc>,
    pub introducer_code: String,
    #[serde(rename = "l")]
    pub left: Option<Box<TreeView>>,
    #[serde(rename = "r")]
    pub right: Option<Box<TreeView>>,
}

impl TreeView {
    /// A view of `node` with no children attached.
    pub fn leaf(node: &Node) -> Self {
        Self {
            code: node.code.clone(),
            name: node.name.clone(),
            registered_at: node.registered_at,
            introducer_code: node.introducer_code.clone(),
            left: None,
            right: None,
        }
    }

    /// Total number of nodes in the view.
    pub fn len(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |v| v.len()) + self.right.as_ref().map_or(0, |v| v.len())
    }

    /// Views always contain at least their root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Generations below the root, 0 for a lone root.
    pub fn depth(&self) -> usize {
        let l = self.left.as_ref().map_or(0, |v| v.depth() + 1);
        let r = self.right.as_ref().map_or(0, |v| v.depth() + 1);
        l.max(r)
    }

    /// Codes in pre-order (node, left, right).
    pub fn codes(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![self];
        while let Some(view) = stack.pop() {
            out.push(view.code.as_str());
            if let Some(r) = &view.right {
                stack.push(r);
            }
            if let Some(l) = &view.left {
                stack.push(l);
            }
        }
        out
    }
}

/// Formatting of serial numbers into codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFormat {
    width: usize,
}

impl CodeFormat {
    /// Widest supported code; `u64::MAX` has 20 digits.
    pub const MAX_WIDTH: usize = 20;

    /// Create a format, clamping the width into `1..=MAX_WIDTH`.
    pub fn new(width: usize) -> Self {
        Self {
            width: width.clamp(1, Self::MAX_WIDTH),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Render a serial as a zero-padded code.
    pub fn format(&self, serial: u64) -> String {
        format!("{:0width$}", serial, width = self.width)
    }
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CODE_WIDTH)
    }
}

//! Depth-bounded subtree reconstruction.
//!
//! A subtree is fetched with a single bulk read of every node whose ancestry
//! path places it at most `max_depth` generations below the queried node.
//! The nested [`TreeView`] is then assembled purely in memory by following
//! left/right ids inside that batch. Links that point outside the batch
//! (deeper nodes, or nodes inserted after the read) render as `null`.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TreeError};
use crate::model::{Node, NodeId, TreeView};
use crate::path::descendant_pattern;
use crate::store::NodeStore;

/// Read-only queries that reconstruct views of the tree.
pub struct TreeReader<'s, S: NodeStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NodeStore + ?Sized> TreeReader<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// View of `root_code` and up to `max_depth` generations below it.
    pub fn subtree(&self, root_code: &str, max_depth: usize) -> Result<TreeView> {
        let root = self
            .store
            .find_node_by_code(root_code)?
            .ok_or_else(|| TreeError::NodeNotFound(root_code.to_string()))?;
        self.subtree_of(root, max_depth)
    }

    /// View rooted at the structural parent of `code`.
    pub fn ancestor_view(&self, code: &str, max_depth: usize) -> Result<TreeView> {
        let node = self
            .store
            .find_node_by_code(code)?
            .ok_or_else(|| TreeError::NodeNotFound(code.to_string()))?;

        let parent_code = node
            .parent_code()
            .ok_or_else(|| TreeError::NodeIsRoot(code.to_string()))?;

        let parent = self.store.find_node_by_code(parent_code)?.ok_or_else(|| {
            TreeError::CorruptTree(format!(
                "{} names missing parent {} in its path",
                code, parent_code
            ))
        })?;
        self.subtree_of(parent, max_depth)
    }

    fn subtree_of(&self, root: Node, max_depth: usize) -> Result<TreeView> {
        if max_depth == 0 {
            return Ok(TreeView::leaf(&root));
        }

        let pattern = descendant_pattern(&root.code, Some(max_depth - 1));
        let batch = self.store.find_nodes_matching(&pattern)?;
        tracing::debug!(root = %root.code, %pattern, fetched = batch.len(), "bulk read");

        Ok(assemble(root, batch))
    }
}

/// Assemble a nested view of `root` from a batch of its descendants.
///
/// Only ids present in `batch` are followed, and each id is expanded at most
/// once.
pub fn assemble(root: Node, batch: Vec<Node>) -> TreeView {
    let mut arena: HashMap<NodeId, Node> =
        batch.into_iter().map(|n| (n.id.clone(), n)).collect();
    let mut seen = HashSet::new();
    seen.insert(root.id.clone());
    build(&root, &mut arena, &mut seen)
}

fn build(node: &Node, arena: &mut HashMap<NodeId, Node>, seen: &mut HashSet<NodeId>) -> TreeView {
    let mut view = TreeView::leaf(node);
    view.left = expand(node.left.as_ref(), arena, seen);
    view.right = expand(node.right.as_ref(), arena, seen);
    view
}

fn expand(
    link: Option<&NodeId>,
    arena: &mut HashMap<NodeId, Node>,
    seen: &mut HashSet<NodeId>,
) -> Option<Box<TreeView>> {
    let id = link?;
    if !seen.insert(id.clone()) {
        return None;
    }
    let child = arena.remove(id)?;
    Some(Box::new(build(&child, arena, seen)))
}

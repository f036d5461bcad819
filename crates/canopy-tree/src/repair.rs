//! Orphan detection and relinking.
//!
//! Placement writes the child before linking it from its parent. If the
//! second write fails the child stays persisted with a correct ancestry path
//! but no parent points at it. This pass finds such nodes and, where the
//! parent still has the open slot, links them back. Nothing is ever deleted.

use serde::Serialize;

use crate::error::{Result, TreeError};
use crate::model::Node;
use crate::path::{self, descendant_pattern};
use crate::store::NodeStore;

/// Outcome of [`relink_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Codes linked back into an open slot of their parent
    pub relinked: Vec<String>,
    /// Codes whose parent is full or missing
    pub unresolved: Vec<String>,
}

/// Locate the root by following any node's path to its first segment.
fn find_root<S: NodeStore + ?Sized>(store: &S) -> Result<Option<Node>> {
    let Some(any) = store.find_any_node()? else {
        return Ok(None);
    };
    match path::first_segment(&any.ancestry_path) {
        None => Ok(Some(any)),
        Some(root_code) => store.find_node_by_code(root_code)?.map(Some).ok_or_else(|| {
            TreeError::CorruptTree(format!("root {} named by {} is missing", root_code, any.code))
        }),
    }
}

/// Non-root nodes that no parent links to, in code order.
pub fn find_orphans<S: NodeStore + ?Sized>(store: &S) -> Result<Vec<Node>> {
    let Some(root) = find_root(store)? else {
        return Ok(Vec::new());
    };

    let mut orphans = Vec::new();
    for node in store.find_nodes_matching(&descendant_pattern(&root.code, None))? {
        let linked = match node.parent_code() {
            Some(parent_code) => store
                .find_node_by_code(parent_code)?
                .is_some_and(|p| p.side_of(&node.id).is_some()),
            None => true,
        };
        if !linked {
            orphans.push(node);
        }
    }
    orphans.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(orphans)
}

/// Link every orphan whose parent still has an open slot.
///
/// Orphans are handled in code order, so when two compete for the last slot
/// of one parent the older code wins.
pub fn relink_orphans<S: NodeStore + ?Sized>(store: &S) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    for orphan in find_orphans(store)? {
        let parent = match orphan.parent_code() {
            Some(code) => store.find_node_by_code(code)?,
            None => None,
        };

        match parent {
            Some(mut parent) => match parent.open_slot() {
                Some(side) => {
                    parent.link(side, orphan.id.clone());
                    store.save_node(&parent)?;
                    tracing::info!(code = %orphan.code, parent = %parent.code, ?side, "relinked orphan");
                    report.relinked.push(orphan.code);
                }
                None => {
                    tracing::warn!(code = %orphan.code, parent = %parent.code, "orphan's parent is full");
                    report.unresolved.push(orphan.code);
                }
            },
            None => {
                tracing::warn!(code = %orphan.code, "orphan's parent is missing");
                report.unresolved.push(orphan.code);
            }
        }
    }

    Ok(report)
}

//! Weight-balanced placement of new policyholders.
//!
//! A new member enters the tree at its introducer. If the introducer has an
//! open slot (left first) the member fills it; otherwise the walk descends
//! into whichever child subtree currently holds fewer members, ties going
//! left, and tries again one level down.
//!
//! ```text
//!            1                 introducer = 1, both slots full
//!          /   \               |subtree(2)| = 2, |subtree(3)| = 0
//!         2     3              -> descend into 3, fill its left slot
//!        / \
//!       4   5
//! ```
//!
//! The walk is greedy: each decision favours the lighter side at the time it
//! is made. It is several independent store operations, not one transaction.

use chrono::Utc;

use crate::error::{Result, TreeError};
use crate::model::{CodeFormat, Node, Side};
use crate::path::descendant_pattern;
use crate::store::NodeStore;
use crate::COUNTER_NAME;

/// Places new nodes into the tree held by a [`NodeStore`].
pub struct PlacementEngine<'s, S: NodeStore + ?Sized> {
    store: &'s S,
    format: CodeFormat,
}

impl<'s, S: NodeStore + ?Sized> PlacementEngine<'s, S> {
    pub fn new(store: &'s S, format: CodeFormat) -> Self {
        Self { store, format }
    }

    /// Create the root. Fails if any node already exists.
    pub fn place_root(&self, name: &str) -> Result<Node> {
        if self.store.find_any_node()?.is_some() {
            return Err(TreeError::RootAlreadyExists);
        }

        let (_, code) = self.allocate_code()?;
        let root = Node::root(code, name.to_string(), Utc::now());
        self.store.save_node(&root)?;

        tracing::info!(code = %root.code, "created root policyholder");
        Ok(root)
    }

    /// Place a new node introduced by `introducer_code`.
    ///
    /// The code is allocated before the walk starts and is not returned to
    /// the counter if anything after that fails.
    pub fn place_node(&self, introducer_code: &str, name: &str) -> Result<Node> {
        let introducer = self
            .store
            .find_node_by_code(introducer_code)?
            .ok_or_else(|| TreeError::IntroducerNotFound(introducer_code.to_string()))?;

        let (serial, code) = self.allocate_code()?;

        // Each step descends one level, and depth is bounded by the number of
        // nodes, which the serial bounds in turn.
        let max_steps = serial;
        let mut current = introducer;
        let mut steps: u64 = 0;

        loop {
            if let Some(side) = current.open_slot() {
                return self.attach(current, side, code, name, introducer_code);
            }

            steps += 1;
            if steps > max_steps {
                return Err(TreeError::CorruptTree(format!(
                    "placement walk from {} exceeded {} steps",
                    introducer_code, max_steps
                )));
            }

            let side = self.lighter_side(&current)?;
            current = self.fetch_child(&current, side)?;
            tracing::debug!(code = %current.code, ?side, "descending");
        }
    }

    /// Fill `side` of `parent` with a new child, then link the parent.
    fn attach(
        &self,
        mut parent: Node,
        side: Side,
        code: String,
        name: &str,
        introducer_code: &str,
    ) -> Result<Node> {
        let child = Node::child_of(
            &parent,
            code,
            name.to_string(),
            introducer_code.to_string(),
            Utc::now(),
        );
        self.store.save_node(&child)?;

        parent.link(side, child.id.clone());
        if let Err(e) = self.store.save_node(&parent) {
            tracing::warn!(
                child = %child.code,
                parent = %parent.code,
                "child persisted but parent link failed; child is orphaned"
            );
            return Err(e.into());
        }

        tracing::info!(
            code = %child.code,
            parent = %parent.code,
            introducer = %introducer_code,
            ?side,
            "placed policyholder"
        );
        Ok(child)
    }

    /// Pick the child whose subtree holds fewer nodes, ties going left.
    fn lighter_side(&self, node: &Node) -> Result<Side> {
        let left = self.fetch_child(node, Side::Left)?;
        let right = self.fetch_child(node, Side::Right)?;

        let left_count = self.subtree_size(&left)?;
        let right_count = self.subtree_size(&right)?;
        tracing::debug!(
            parent = %node.code,
            left = left_count,
            right = right_count,
            "comparing subtrees"
        );

        Ok(if left_count <= right_count {
            Side::Left
        } else {
            Side::Right
        })
    }

    /// Members strictly below `node`.
    fn subtree_size(&self, node: &Node) -> Result<usize> {
        let pattern = descendant_pattern(&node.code, None);
        Ok(self.store.count_nodes_matching(&pattern)?)
    }

    fn fetch_child(&self, node: &Node, side: Side) -> Result<Node> {
        let id = node.child(side).ok_or_else(|| {
            TreeError::CorruptTree(format!("{} has no {:?} child", node.code, side))
        })?;
        self.store.find_node_by_id(id)?.ok_or_else(|| {
            tracing::warn!(parent = %node.code, child = %id, "dangling child link");
            TreeError::CorruptTree(format!("{} links to missing node {}", node.code, id))
        })
    }

    fn allocate_code(&self) -> Result<(u64, String)> {
        let serial = self.store.next_serial(COUNTER_NAME)?;
        Ok((serial, self.format.format(serial)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::NodeId;
    use crate::path::PathPattern;
    use crate::store::{MemoryStore, StoreResult};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn code(n: u64) -> String {
        CodeFormat::default().format(n)
    }

    fn engine(store: &MemoryStore) -> PlacementEngine<'_, MemoryStore> {
        PlacementEngine::new(store, CodeFormat::default())
    }

    fn node(store: &MemoryStore, n: u64) -> Node {
        store.find_node_by_code(&code(n)).unwrap().unwrap()
    }

    fn child_code(store: &MemoryStore, parent: &Node, side: Side) -> Option<String> {
        parent
            .child(side)
            .map(|id| store.find_node_by_id(id).unwrap().unwrap().code)
    }

    #[test]
    fn root_is_created_once() {
        let store = MemoryStore::new();
        let root = engine(&store).place_root("Policyholder Name").unwrap();
        assert_eq!(root.code, "0000000001");
        assert_eq!(root.introducer_code, "");
        assert_eq!(root.ancestry_path, "");

        let err = engine(&store).place_root("Again").unwrap_err();
        assert!(matches!(err, TreeError::RootAlreadyExists));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn unknown_introducer() {
        let store = MemoryStore::new();
        engine(&store).place_root("Root").unwrap();
        let err = engine(&store)
            .place_node("not found introducer", "Child")
            .unwrap_err();
        assert!(matches!(err, TreeError::IntroducerNotFound(c) if c == "not found introducer"));
        // Nothing allocated for a rejected precondition.
        assert_eq!(store.next_serial(COUNTER_NAME).unwrap(), 2);
    }

    #[test]
    fn first_child_left_second_right() {
        let store = MemoryStore::new();
        let e = engine(&store);
        let root = e.place_root("Root").unwrap();
        let a = e.place_node(&root.code, "A").unwrap();
        let b = e.place_node(&root.code, "B").unwrap();

        let root = node(&store, 1);
        assert_eq!(root.left, Some(a.id));
        assert_eq!(root.right, Some(b.id));
        assert_eq!(a.ancestry_path, "0000000001");
        assert_eq!(b.introducer_code, "0000000001");
    }

    #[test]
    fn fifteen_node_scenario() {
        let store = MemoryStore::new();
        let e = engine(&store);
        e.place_root("Root").unwrap();
        for introducer in [1, 1, 2, 2, 1, 1, 2, 2, 2, 2, 6, 3, 3, 3] {
            e.place_node(&code(introducer), "member").unwrap();
        }
        assert_eq!(store.len().unwrap(), 15);

        let expected = [
            (1, 2, 3),
            (2, 4, 5),
            (3, 6, 7),
            (4, 8, 10),
            (5, 9, 11),
            (6, 12, 14),
            (7, 13, 15),
        ];
        for (parent, left, right) in expected {
            let p = node(&store, parent);
            assert_eq!(child_code(&store, &p, Side::Left), Some(code(left)), "left of {}", parent);
            assert_eq!(child_code(&store, &p, Side::Right), Some(code(right)), "right of {}", parent);
        }

        assert_eq!(node(&store, 8).ancestry_path, "0000000001/0000000002/0000000004");
        assert_eq!(node(&store, 10).ancestry_path, "0000000001/0000000002/0000000004");
        assert_eq!(node(&store, 9).ancestry_path, "0000000001/0000000002/0000000005");
        assert_eq!(node(&store, 12).ancestry_path, "0000000001/0000000003/0000000006");
        assert_eq!(node(&store, 15).ancestry_path, "0000000001/0000000003/0000000007");
        for leaf in 8..=15 {
            assert_eq!(node(&store, leaf).open_slot(), Some(Side::Left));
        }
        // Introducer is kept even when the structural parent differs.
        assert_eq!(node(&store, 12).introducer_code, code(6));
        assert_eq!(node(&store, 13).introducer_code, code(3));
    }

    #[test]
    fn dangling_link_is_reported() {
        let store = MemoryStore::new();
        let e = engine(&store);
        let mut root = e.place_root("Root").unwrap();
        root.link(Side::Left, NodeId::new("gone-left"));
        root.link(Side::Right, NodeId::new("gone-right"));
        store.save_node(&root).unwrap();

        let err = e.place_node(&root.code, "X").unwrap_err();
        assert!(matches!(err, TreeError::CorruptTree(_)));
    }

    #[test]
    fn cycle_hits_step_cap() {
        let store = MemoryStore::new();
        let e = engine(&store);
        let mut root = e.place_root("Root").unwrap();
        // Both slots point back at the root itself.
        root.link(Side::Left, root.id.clone());
        root.link(Side::Right, root.id.clone());
        store.save_node(&root).unwrap();

        let err = e.place_node(&root.code, "X").unwrap_err();
        assert!(matches!(err, TreeError::CorruptTree(msg) if msg.contains("exceeded")));
    }

    /// Store whose n-th save fails.
    struct FailingSave {
        inner: MemoryStore,
        saves: AtomicUsize,
        fail_at: usize,
    }

    impl NodeStore for FailingSave {
        fn find_node_by_code(&self, code: &str) -> StoreResult<Option<Node>> {
            self.inner.find_node_by_code(code)
        }
        fn find_node_by_id(&self, id: &NodeId) -> StoreResult<Option<Node>> {
            self.inner.find_node_by_id(id)
        }
        fn find_any_node(&self) -> StoreResult<Option<Node>> {
            self.inner.find_any_node()
        }
        fn find_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<Vec<Node>> {
            self.inner.find_nodes_matching(pattern)
        }
        fn count_nodes_matching(&self, pattern: &PathPattern) -> StoreResult<usize> {
            self.inner.count_nodes_matching(pattern)
        }
        fn save_node(&self, node: &Node) -> StoreResult<()> {
            if self.saves.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(StoreError::new("timed out"));
            }
            self.inner.save_node(node)
        }
        fn next_serial(&self, counter: &str) -> StoreResult<u64> {
            self.inner.next_serial(counter)
        }
    }

    #[test]
    fn failed_parent_link_leaves_orphan_and_gap() {
        // save 0: root, save 1: child, save 2: parent link (fails)
        let store = FailingSave {
            inner: MemoryStore::new(),
            saves: AtomicUsize::new(0),
            fail_at: 2,
        };
        let e = PlacementEngine::new(&store, CodeFormat::default());
        let root = e.place_root("Root").unwrap();

        let err = e.place_node(&root.code, "Orphan").unwrap_err();
        assert!(matches!(err, TreeError::StoreUnavailable(_)));

        let orphan = store.inner.find_node_by_code(&code(2)).unwrap().unwrap();
        assert_eq!(orphan.ancestry_path, root.code);
        let root = store.inner.find_node_by_code(&root.code).unwrap().unwrap();
        assert_eq!(root.left, None);

        // The consumed serial is not reused.
        let next = e.place_node(&root.code, "Next").unwrap();
        assert_eq!(next.code, code(3));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn every_path_extends_its_parent(picks in prop::collection::vec(any::<prop::sample::Index>(), 1..40)) {
            let store = MemoryStore::new();
            let e = engine(&store);
            e.place_root("Root").unwrap();
            let mut placed = 1u64;
            for pick in picks {
                let introducer = pick.index(placed as usize) as u64 + 1;
                e.place_node(&code(introducer), "m").unwrap();
                placed += 1;
            }

            let all = store.find_nodes_matching(&descendant_pattern(&code(1), None)).unwrap();
            prop_assert_eq!(all.len() as u64, placed - 1);
            for child in &all {
                let parent_code = child.parent_code().unwrap();
                let parent = store.find_node_by_code(parent_code).unwrap().unwrap();
                prop_assert_eq!(&child.ancestry_path, &parent.lineage());
                prop_assert!(parent.side_of(&child.id).is_some());
            }
        }

        #[test]
        fn siblings_below_the_root_stay_balanced(n in 2usize..64) {
            let store = MemoryStore::new();
            let e = engine(&store);
            e.place_root("Root").unwrap();
            for _ in 0..n {
                e.place_node(&code(1), "m").unwrap();
            }
            let root = node(&store, 1);
            let left = store.find_node_by_id(root.left.as_ref().unwrap()).unwrap().unwrap();
            let right = store.find_node_by_id(root.right.as_ref().unwrap()).unwrap().unwrap();
            let l = store.count_nodes_matching(&descendant_pattern(&left.code, None)).unwrap();
            let r = store.count_nodes_matching(&descendant_pattern(&right.code, None)).unwrap();
            prop_assert!(l >= r && l - r <= 1);
        }
    }
}

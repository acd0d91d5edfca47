//! The tree (spec §3, §4.B).
//!
//! A [`Tree`] is an in-memory, versioned hierarchy of [`TreeNode`]s keyed by
//! [`NodeIdent`](crate::path::NodeIdent). It knows nothing about patterns,
//! conditions, commands, or the keep-while graph -- those live in
//! `crate::walker`, `crate::keep_while`, and `crate::state_machine`
//! respectively. `Tree` only guarantees the structural invariants of §3:
//! monotonically increasing versions, and identity destroyed on delete.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::{NodeIdent, Path};

/// What a node currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Payload {
    #[default]
    None,
    Data(Value),
    /// A registered procedure, referenced by name. The procedure body itself
    /// lives in the caller's stored-proc registry (`crate::store::Store`);
    /// the tree only remembers which name is bound here, matching the rest
    /// of the crate's rule that side effects never live inside deterministic
    /// state.
    StoredProc(String),
}

impl Payload {
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Payload::Data(_))
    }

    #[must_use]
    pub fn is_sproc(&self) -> bool {
        matches!(self, Payload::StoredProc(_))
    }

    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match self {
            Payload::Data(v) => Some(v),
            _ => None,
        }
    }
}

/// A single tree node: its payload, two independent version counters, and
/// its direct children.
///
/// `payload_version` increments whenever the payload is set or cleared.
/// `child_list_version` increments whenever a direct child is added or
/// removed (not when a grandchild changes). Both start at `0` for a freshly
/// created node; a node that is deleted and later recreated at the same
/// path is a new identity and starts over at `0` (spec §3, "identity
/// destroyed on delete").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TreeNode {
    pub payload: Payload,
    pub payload_version: u64,
    pub child_list_version: u64,
    pub children: BTreeMap<NodeIdent, TreeNode>,
}

impl TreeNode {
    fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
        self.payload_version += 1;
    }
}

/// The tree itself: a single root node plus path-keyed accessors.
///
/// `Tree` is cheaply `Clone`-able (it is a plain value type) which is what
/// [`Tree::snapshot`] relies on; the state machine clones the whole tree on
/// snapshot rather than carrying a copy-on-write scheme, serializing a
/// fully-materialized value rather than a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tree {
    pub root: TreeNode,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &[NodeIdent]) -> Option<&TreeNode> {
        let mut cur = &self.root;
        for id in path {
            cur = cur.children.get(id)?;
        }
        Some(cur)
    }

    pub fn get_mut(&mut self, path: &[NodeIdent]) -> Option<&mut TreeNode> {
        let mut cur = &mut self.root;
        for id in path {
            cur = cur.children.get_mut(id)?;
        }
        Some(cur)
    }

    /// Create every missing node along `path`, returning a mutable reference
    /// to the final node. Newly created intermediate nodes get an empty
    /// (`None`) payload.
    pub fn ensure_path(&mut self, path: &[NodeIdent]) -> &mut TreeNode {
        let mut cur = &mut self.root;
        for id in path {
            let existed = cur.children.contains_key(id);
            let entry = cur.children.entry(id.clone()).or_default();
            if !existed {
                cur.child_list_version += 1;
            }
            cur = entry;
        }
        cur
    }

    /// Set the payload at `path`, creating intermediate nodes as needed.
    /// Returns the node's new `payload_version`.
    pub fn set_payload(&mut self, path: &[NodeIdent], payload: Payload) -> u64 {
        let node = self.ensure_path(path);
        node.set_payload(payload);
        node.payload_version
    }

    /// Clear the payload at `path` without removing the node or its
    /// children. No-op (but still bumps the version) if the node has no
    /// parent to register the removal against -- payload clearing never
    /// touches `child_list_version`.
    pub fn clear_payload(&mut self, path: &[NodeIdent]) -> Option<u64> {
        let node = self.get_mut(path)?;
        node.set_payload(Payload::None);
        Some(node.payload_version)
    }

    /// Detach and return the subtree rooted at `path`. The parent's
    /// `child_list_version` is bumped; the removed subtree (and everything
    /// under it) loses its identity -- if a node is later recreated at the
    /// same path, its version counters start again from zero.
    pub fn remove(&mut self, path: &[NodeIdent]) -> Option<TreeNode> {
        let (parent_path, last) = path.split_last().map(|(l, p)| (p, l.clone()))?;
        let parent = self.get_mut(parent_path)?;
        let removed = parent.children.remove(&last);
        if removed.is_some() {
            parent.child_list_version += 1;
        }
        removed
    }

    /// True if a node exists at `path` (distinct from having data: an
    /// intermediate container node "exists" with an empty payload).
    #[must_use]
    pub fn exists(&self, path: &[NodeIdent]) -> bool {
        self.get(path).is_some()
    }

    /// Direct children identifiers, in their natural (lexicographic,
    /// `BTreeMap`-ordered) iteration order -- the order the walker relies on
    /// for deterministic traversal.
    #[must_use]
    pub fn child_idents<'a>(&self, node: &'a TreeNode) -> impl Iterator<Item = &'a NodeIdent> {
        node.children.keys()
    }

    /// Full-tree snapshot used by the `Log` contract's restore path and by
    /// `crate::snapshot`.
    #[must_use]
    pub fn snapshot(&self) -> Tree {
        self.clone()
    }

    /// Absolute path of a node reached from the root, descending through
    /// `prefix`; used by the keep-while cascade and the dispatcher to
    /// reconstruct full paths while walking subtrees.
    #[must_use]
    pub fn join(prefix: &[NodeIdent], child: &NodeIdent) -> Path {
        let mut p = prefix.to_vec();
        p.push(child.clone());
        p
    }
}

//! The keep-while dependency graph and cascading deletion (spec §4.D).
//!
//! A *watcher* node is kept alive only while a set of conditions hold
//! against one or more *watched* nodes elsewhere in the tree (the
//! `keep_while` option on a command, see `crate::options::CommandOptions`).
//! [`KeepWhileGraph`] stores this as a small bidirectional edge map -- a
//! forward index (watcher -> watched -> condition) for evaluating whether a
//! watcher's conditions currently hold, and a reverse index (watched ->
//! watchers) so a tree mutation at a given path can cheaply find which
//! watchers might now be invalidated.
//!
//! The graph itself never touches the tree directly; [`cascade_delete`] is
//! the only function that mutates both together, and it is the one place
//! the deterministic ordering and cycle-safety guarantees of spec §4.D are
//! implemented.

use std::collections::{BTreeMap, BTreeSet};

use crate::path::{Condition, NodeIdent, Path};
use crate::tree::{Payload, Tree};

/// Bidirectional watcher/watched edge map with per-edge conditions.
///
/// A small owned graph of paths rather than opaque node ids, carrying no
/// internal locking: the graph always lives behind the same single-writer
/// mutex as the rest of the state machine (`crate::state_machine::State`),
/// so it is a plain value type.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeepWhileGraph {
    forward: BTreeMap<Path, BTreeMap<Path, Condition>>,
    reverse: BTreeMap<Path, BTreeSet<Path>>,
}

impl KeepWhileGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire set of watches held by `watcher`. Passing an
    /// empty map clears all of `watcher`'s edges without otherwise
    /// affecting the graph.
    pub fn set_watches(&mut self, watcher: Path, watches: BTreeMap<Path, Condition>) {
        self.clear_watcher(&watcher);
        if watches.is_empty() {
            return;
        }
        for watched in watches.keys() {
            self.reverse
                .entry(watched.clone())
                .or_default()
                .insert(watcher.clone());
        }
        self.forward.insert(watcher, watches);
    }

    /// Drop every edge whose watcher is `watcher` (called when `watcher` is
    /// itself deleted, including as part of a cascade).
    pub fn clear_watcher(&mut self, watcher: &Path) {
        if let Some(watches) = self.forward.remove(watcher) {
            for watched in watches.keys() {
                if let Some(watchers) = self.reverse.get_mut(watched) {
                    watchers.remove(watcher);
                    if watchers.is_empty() {
                        self.reverse.remove(watched);
                    }
                }
            }
        }
    }

    /// Watchers that have an edge watching `watched`.
    #[must_use]
    pub fn watchers_of(&self, watched: &Path) -> Vec<Path> {
        self.reverse
            .get(watched)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Whether every watched condition `watcher` depends on currently holds.
    /// A watcher with no edges trivially holds.
    #[must_use]
    pub fn conditions_hold(&self, tree: &Tree, watcher: &Path) -> bool {
        let Some(watches) = self.forward.get(watcher) else {
            return true;
        };
        watches.iter().all(|(watched, cond)| {
            let existing = tree.get(watched);
            let name = watched.last().cloned().unwrap_or_else(|| NodeIdent::name(""));
            cond.matches(existing, &name).unwrap_or(false)
        })
    }
}

/// Depth-first, pre-order list of `root` and every descendant (with each
/// node's payload as it stood immediately before removal), children visited
/// in identifier (`BTreeMap`) order -- the order a subtree is fully consumed
/// before a cascade moves to the next candidate (spec §4.D, "descendants
/// before siblings").
fn preorder_paths(tree: &Tree, root: &Path) -> Vec<(Path, Payload)> {
    let mut out = Vec::new();
    if let Some(node) = tree.get(root) {
        out.push((root.clone(), node.payload.clone()));
        for (name, _) in &node.children {
            let child = Tree::join(root, name);
            out.extend(preorder_paths(tree, &child));
        }
    }
    out
}

/// Find watchers newly invalidated by a mutation at one of `changed` paths:
/// still-existing watchers of a changed path whose conditions no longer all
/// hold.
fn failing_watchers(tree: &Tree, graph: &KeepWhileGraph, changed: &[Path]) -> Vec<Path> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for path in changed {
        for watcher in graph.watchers_of(path) {
            if tree.exists(&watcher) && !graph.conditions_hold(tree, &watcher) && seen.insert(watcher.clone()) {
                out.push(watcher);
            }
        }
    }
    out
}

/// Run the cascading deletion fixpoint triggered by a mutation that changed
/// `changed` paths (typically the single path a command just wrote to, plus
/// any ancestors whose `child_list_version` moved).
///
/// Deletion order is deterministic: candidates are sorted lexicographically
/// by path at each round, and each candidate's whole subtree is removed
/// (descendants collected in pre-order) before the next candidate in that
/// round is considered. A per-command visited set guards against cycles --
/// a watcher can never be reconsidered once deleted, however many edges
/// point to it. Returns every (path, payload) removed, in deletion order,
/// the payload captured immediately before removal so the dispatcher can
/// turn each into a delete event carrying what was actually lost.
pub fn cascade_delete(
    tree: &mut Tree,
    graph: &mut KeepWhileGraph,
    changed: &[Path],
) -> Vec<(Path, Payload)> {
    let mut visited: BTreeSet<Path> = BTreeSet::new();
    let mut deleted_order: Vec<(Path, Payload)> = Vec::new();
    let mut frontier = failing_watchers(tree, graph, changed);

    while !frontier.is_empty() {
        frontier.sort();
        frontier.dedup();

        let mut just_changed: Vec<Path> = Vec::new();
        for root in &frontier {
            if visited.contains(root) || !tree.exists(root) {
                continue;
            }
            let subtree = preorder_paths(tree, root);
            for (p, _) in &subtree {
                visited.insert(p.clone());
                graph.clear_watcher(p);
            }
            tree.remove(root);
            just_changed.extend(subtree.iter().map(|(p, _)| p.clone()));
            deleted_order.extend(subtree);
        }

        frontier = failing_watchers(tree, graph, &just_changed)
            .into_iter()
            .filter(|p| !visited.contains(p))
            .collect();
    }

    deleted_order
}

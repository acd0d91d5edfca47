//! Assertion functions for testing store state and dispatched side effects.

use serde_json::Value;

use crate::options::CommandOptions;
use crate::state_machine::{Reply, SideEffect};
use crate::store::Store;
use crate::tree::Payload;

/// Assert that `pattern` resolves to a single existing node whose payload
/// is `Payload::Data(expected)`.
///
/// # Panics
/// Panics if the node is missing, has no payload, or holds a different
/// value.
pub fn assert_payload_eq(store: &Store, pattern: &str, expected: Value) {
    let actual = store.get_one(pattern).unwrap_or_else(|e| {
        panic!("expected node at {pattern:?} to exist with payload {expected:?}, but get failed: {e}")
    });
    assert_eq!(
        actual,
        Payload::Data(expected.clone()),
        "payload mismatch at {pattern:?}: expected Data({expected:?}), got {actual:?}"
    );
}

/// Assert that `pattern` does not resolve to any existing node.
///
/// # Panics
/// Panics if the node exists.
pub fn assert_node_missing(store: &Store, pattern: &str) {
    assert!(
        !store.exists(pattern),
        "expected no node to exist at {pattern:?}, but one does"
    );
}

/// Assert that `pattern` matches exactly `expected_count` existing nodes.
///
/// # Panics
/// Panics if the actual match count differs.
pub fn assert_match_count(store: &Store, pattern: &str, expected_count: usize) {
    let actual = store.count(pattern);
    assert_eq!(
        actual, expected_count,
        "expected {pattern:?} to match {expected_count} node(s), matched {actual}"
    );
}

/// Assert a batch of `Reply::Many` node paths carries `expected_count`
/// entries, panicking with a readable message otherwise -- useful after a
/// `PutMany`/`DeleteMany`/wildcard `Get`.
///
/// # Panics
/// Panics if `reply` is not `Reply::Many` or has a different length.
pub fn assert_many_len(reply: &Reply, expected_count: usize) {
    match reply {
        Reply::Many(m) => assert_eq!(
            m.len(),
            expected_count,
            "expected {expected_count} matched node(s), got {}: {:?}",
            m.len(),
            m.keys().collect::<Vec<_>>()
        ),
        other => panic!("expected Reply::Many, got {other:?}"),
    }
}

/// Assert that at least one of `effects` satisfies `predicate` -- useful
/// for checking that a command produced a specific side effect (a cascade
/// deletion, a particular node creation) without pinning down the entire
/// effect list.
///
/// # Panics
/// Panics if no effect satisfies `predicate`.
pub fn assert_effects_contain(effects: &[SideEffect], predicate: impl Fn(&SideEffect) -> bool) {
    assert!(
        effects.iter().any(predicate),
        "expected at least one side effect matching the predicate, got {effects:?}"
    );
}

/// Convenience over [`Store::put`] with default options, panicking on
/// failure -- for test setup where a failed write indicates a broken
/// fixture, not a case under test.
///
/// # Panics
/// Panics if the write fails.
pub fn seed(store: &Store, pattern: &str, payload: Value) {
    store
        .put(pattern, Payload::Data(payload), CommandOptions::new())
        .unwrap_or_else(|e| panic!("failed to seed {pattern:?}: {e}"));
}

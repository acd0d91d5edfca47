//! Testing utilities for applications built on [`crate::store::Store`].
//!
//! A thin wrapper ([`TestStore`]) around the public API plus
//! free-standing assertion helpers, test data builders, and fixtures, so
//! downstream crates can write idiomatic tests against a store without
//! wiring up registries and a view store by hand each time.
//!
//! # Quick start
//!
//! ```no_run
//! use arboreal::testing::*;
//! use arboreal::options::CommandOptions;
//! use arboreal::tree::Payload;
//!
//! let store = TestStore::new();
//! store.put("/stock/oak", Payload::Data(serde_json::json!(12)), CommandOptions::new()).unwrap();
//! assert_payload_eq(&store, "/stock/oak", serde_json::json!(12));
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

use std::ops::Deref;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::projections::FunctionRegistry;
use crate::store::Store;
use crate::transaction::TxRegistry;
use crate::triggers::ProcRegistry;
use crate::view_store::InMemoryViewStore;

/// A test-focused wrapper around [`Store`] with a default, fully in-memory
/// setup (no registered stored procedures or projection functions -- add
/// them with [`Self::with_procs`]/[`Self::with_functions`]).
#[derive(Clone)]
pub struct TestStore {
    store: Store,
}

impl TestStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Store::new(
                TxRegistry::new(),
                ProcRegistry::new(),
                FunctionRegistry::new(),
                Arc::new(InMemoryViewStore::new()),
                StoreConfig::default(),
            ),
        }
    }

    #[must_use]
    pub fn with_procs(procs: ProcRegistry) -> Self {
        Self {
            store: Store::new(
                TxRegistry::new(),
                procs,
                FunctionRegistry::new(),
                Arc::new(InMemoryViewStore::new()),
                StoreConfig::default(),
            ),
        }
    }

    #[must_use]
    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self {
            store: Store::new(
                TxRegistry::new(),
                ProcRegistry::new(),
                functions,
                Arc::new(InMemoryViewStore::new()),
                StoreConfig::default(),
            ),
        }
    }

    #[must_use]
    pub fn with_registries(
        procs: ProcRegistry,
        functions: FunctionRegistry,
        tx_registry: TxRegistry,
    ) -> Self {
        Self {
            store: Store::new(
                tx_registry,
                procs,
                functions,
                Arc::new(InMemoryViewStore::new()),
                StoreConfig::default(),
            ),
        }
    }

    /// Number of log entries committed so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.store.log().index()
    }

    /// Print the tree to stdout, for debugging a failing test.
    pub fn debug_print_tree(&self) {
        self.store.log().with_state(|state| {
            println!("Tree (commit {}):", self.store.log().index());
            debug_print_node(&state.tree.root, 0);
        });
    }
}

fn debug_print_node(node: &crate::tree::TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}payload={:?} v{}", node.payload, node.payload_version);
    for (name, child) in &node.children {
        println!("{indent}{name}:");
        debug_print_node(child, depth + 1);
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl AsRef<Store> for TestStore {
    fn as_ref(&self) -> &Store {
        &self.store
    }
}

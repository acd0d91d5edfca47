//! # Arboreal
//!
//! A **replicated tree store core**: a path-addressed hierarchical
//! key/value tree whose every mutation is a deterministic, log-replicated
//! command, with a keep-while dependency graph for cascading deletion and a
//! trigger/projection dispatcher for reacting to changes.
//!
//! ## Key Features
//!
//! - **Path patterns** - literal segments, `*`/`**` wildcards, and
//!   structural/data conditions (`crate::path`)
//! - **Deterministic core** - `State::apply` is a pure `(State, Command) ->
//!   (State, Reply, Vec<SideEffect>)` function (`crate::state_machine`)
//! - **Keep-while cascading deletion** - nodes can watch other nodes under
//!   a condition and are deleted when it stops holding (`crate::keep_while`)
//! - **Triggers & projections** - replicated registrations whose actual
//!   functions are resolved process-locally by name (`crate::dispatch`,
//!   `crate::triggers`, `crate::projections`)
//! - **Transactions** - named, registry-resolved functions running against
//!   a mutable view of the tree (`crate::transaction`)
//! - **Snapshotting** - checksummed full-state snapshots, feature
//!   `snapshotting` (`crate::snapshot`)
//! - **Metrics** - command/trigger/projection/cascade counters, feature
//!   `metrics` (`crate::metrics`)
//!
//! ## Quick Start
//!
//! ```
//! use arboreal::options::CommandOptions;
//! use arboreal::store::Store;
//! use arboreal::tree::Payload;
//! use std::sync::Arc;
//!
//! let store = Store::new(
//!     arboreal::transaction::TxRegistry::new(),
//!     arboreal::triggers::ProcRegistry::new(),
//!     arboreal::projections::FunctionRegistry::new(),
//!     Arc::new(arboreal::view_store::InMemoryViewStore::new()),
//!     arboreal::config::StoreConfig::default(),
//! );
//!
//! store.put("/stock/oak", Payload::Data(serde_json::json!(12)), CommandOptions::new()).unwrap();
//! assert_eq!(store.get_one("/stock/oak").unwrap(), Payload::Data(serde_json::json!(12)));
//! ```
//!
//! ## Core Concepts
//!
//! ### The Tree
//!
//! A [`tree::Tree`] is a rooted tree of [`tree::TreeNode`]s, each carrying
//! an optional [`tree::Payload`] (`Data` or `StoredProc`), a
//! monotonically-increasing `payload_version`, and a `child_list_version`
//! that advances whenever its children change. Node identity is destroyed
//! on deletion: recreating a node under the same path starts both versions
//! back at zero (spec invariant: no version ever travels across a delete).
//!
//! ### Path Patterns
//!
//! Every command names its target(s) with a [`path::PathPattern`]: a
//! sequence of literal identifiers, `*` (one sibling), `**` (zero or more
//! levels), or a [`path::Condition`] (name regex, data match, existence,
//! version equality, child count, and boolean combinators). Single-target
//! mutations (`Create`/`Update`/`CompareAndSwap`) require the pattern to be
//! *specific*: able to resolve to at most one node regardless of the
//! current tree (`path::is_specific`).
//!
//! ### The Deterministic Core
//!
//! [`state_machine::State::apply`] is the only place commands actually
//! run. It never touches a clock, a random source, or an external
//! registry directly -- anything that would make two replicas diverge
//! (firing a trigger, running a transaction function) is either emitted as
//! a [`state_machine::SideEffect`] for the caller to carry out afterward,
//! or resolved through a process-local registry the caller supplies
//! (`transaction::TxRegistry`, `triggers::ProcRegistry`,
//! `projections::FunctionRegistry`) that every replica is expected to
//! populate identically.
//!
//! ### Keep-While
//!
//! [`keep_while::KeepWhileGraph`] tracks, for each watcher node, a map of
//! watched paths to the [`path::Condition`] that must keep holding. Any
//! mutation that could invalidate a condition triggers
//! [`keep_while::cascade_delete`], which removes every watcher whose
//! condition now fails, then every *their* watchers, and so on, in
//! deterministic (lexicographic, descendants-before-siblings) order, safe
//! against cycles.
//!
//! ### Triggers & Projections
//!
//! A trigger ([`dispatch::TriggerSpec`]) names a pattern, a set of
//! [`dispatch::EventAction`]s, and the path to a `Payload::StoredProc` node
//! to invoke on a match; [`triggers::fire_triggers`] does the invoking,
//! leader-only and at-least-once, looking the stored procedure's closure up
//! in a [`triggers::ProcRegistry`]. A projection ([`dispatch::ProjectionSpec`])
//! instead writes into a [`view_store::ViewStore`] via
//! [`projections::apply_projections`], on every replica, resolving its
//! function by name in a [`projections::FunctionRegistry`].
//!
//! ### Transactions
//!
//! [`transaction::TxBuilder`] resolves a transaction's mode (`ReadOnly`,
//! `ReadWrite`, or the conservative `Auto` fallback) before building a wire
//! -safe [`transaction::TxRequest`]; [`transaction::run`] looks the named
//! function up in a [`transaction::TxRegistry`] and runs it against a
//! [`transaction::TxContext`] borrowing the live tree.
//!
//! ## Testing Your Stores
//!
//! The [`testing`] module provides a [`testing::TestStore`] wrapper plus
//! assertion helpers, test data builders, and fixtures, mirroring how the
//! rest of this crate is tested internally.
//!
//! ```
//! use arboreal::testing::*;
//!
//! let store = inventory_fixture();
//! assert_payload_eq(&store, "/stock/oak", serde_json::json!(12));
//! assert_match_count(&store, "/stock/*", 2);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod keep_while;
pub mod log;
pub mod options;
pub mod path;
pub mod projections;
pub mod state_machine;
pub mod store;
pub mod testing;
pub mod transaction;
pub mod tree;
pub mod triggers;
pub mod view_store;
pub mod walker;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "snapshotting")]
pub mod snapshot;

pub use config::StoreConfig;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use log::Log;
pub use options::{CommandOptions, Favor};
pub use path::{Condition, NodeIdent, Path, PathPattern};
pub use state_machine::{Command, Reply, SideEffect, State};
pub use store::Store;
pub use tree::{Payload, Tree, TreeNode};

//! Transactions (spec §4.F).
//!
//! A transaction function, like a trigger's stored procedure, is not data
//! that can cross the replication boundary: it must be bitwise-identical on
//! every replica for `ReadWrite`/`Auto` execution to stay deterministic, so
//! -- exactly as with `crate::triggers`/`crate::projections` -- only its
//! *name* travels inside a [`TxRequest`]. The actual closure is looked up
//! in a process-local [`TxRegistry`] that every replica is expected to
//! populate identically before joining.
//!
//! Rust closures cannot be statically inspected the way an `Auto`
//! classification would require (walk the function body for mutating
//! primitive calls); [`TxBuilder`] resolves `Auto` at submission time
//! instead, via explicit capability tagging, before a [`TxRequest`] is ever
//! built (see `TxBuilder::build`'s doc comment for the exact policy).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::keep_while::KeepWhileGraph;
use crate::path::{Path, PathPattern};
use crate::state_machine::{SideEffect, State};
use crate::tree::{Payload, Tree};
use crate::walker::resolve_many;

/// The mode a caller asks for when building a transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
    Auto,
}

/// The mode actually carried on the wire: `Auto` is always resolved to one
/// of these two before a [`TxRequest`] is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedTxMode {
    ReadOnly,
    ReadWrite,
}

/// A replicated request to run a named transaction function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRequest {
    pub function_name: String,
    pub mode: ResolvedTxMode,
}

/// Builds a [`TxRequest`], resolving `TxMode::Auto` via explicit capability
/// tagging rather than static analysis.
pub struct TxBuilder {
    function_name: String,
    mode: Option<ResolvedTxMode>,
    strict: bool,
}

impl TxBuilder {
    #[must_use]
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            mode: None,
            strict: false,
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.mode = Some(ResolvedTxMode::ReadOnly);
        self
    }

    #[must_use]
    pub fn read_write(mut self) -> Self {
        self.mode = Some(ResolvedTxMode::ReadWrite);
        self
    }

    /// Refuse to resolve an unpinned `Auto` request with `UnanalyzableTxFun`
    /// instead of conservatively falling back to `ReadWrite`.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Resolve to a [`TxRequest`].
    ///
    /// # Errors
    /// `UnanalyzableTxFun` if no mode was pinned and `strict()` was set.
    pub fn build(self) -> StoreResult<TxRequest> {
        let mode = match self.mode {
            Some(m) => m,
            None if self.strict => return Err(StoreError::new(ErrorKind::UnanalyzableTxFun)),
            // Conservative Auto fallback: treat an unclassified function as
            // ReadWrite, since that is always a safe superset of ReadOnly.
            None => ResolvedTxMode::ReadWrite,
        };
        Ok(TxRequest {
            function_name: self.function_name,
            mode,
        })
    }
}

/// The result of running a transaction function to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxOutcome {
    Committed(Value),
    Aborted { reason: AbortReason },
}

/// Why a transaction did not commit: an application-chosen abort value, or
/// a store-level exception (an attempted mutation inside a read-only
/// transaction, a missing node, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbortReason {
    User(Value),
    Exception(StoreError),
}

/// What a transaction function operates on. Mutating methods are rejected
/// with `StoreUpdateDenied` when the transaction is `ReadOnly`; every
/// accepted mutation is recorded as a [`SideEffect`] exactly like the
/// top-level commands in `crate::state_machine`, so dispatch still sees a
/// uniform side-effect stream regardless of whether it came from a single
/// command or a transaction.
pub struct TxContext<'a> {
    tree: &'a mut Tree,
    keep_while: &'a mut KeepWhileGraph,
    read_only: bool,
    pub effects: Vec<SideEffect>,
}

impl<'a> TxContext<'a> {
    fn require_writable(&self) -> StoreResult<()> {
        if self.read_only {
            Err(StoreError::new(ErrorKind::StoreUpdateDenied))
        } else {
            Ok(())
        }
    }

    /// Read the payload at `path`, or `None` if the node does not exist.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Payload> {
        self.tree.get(path).map(|n| n.payload.clone())
    }

    /// Read every node matching `pattern`.
    ///
    /// # Errors
    /// Propagates a malformed pattern as `MismatchingNode`.
    pub fn get_many(&self, pattern: &PathPattern) -> StoreResult<Vec<(Path, Payload)>> {
        Ok(resolve_many(self.tree, pattern)?
            .into_iter()
            .filter_map(|m| self.tree.get(&m.path).map(|n| (m.path, n.payload.clone())))
            .collect())
    }

    /// Write `payload` at `path`, creating intermediate nodes as needed.
    ///
    /// # Errors
    /// `StoreUpdateDenied` inside a read-only transaction.
    pub fn put(&mut self, path: &Path, payload: Payload) -> StoreResult<()> {
        self.require_writable()?;
        let old_payload = self.tree.get(path).map(|n| n.payload.clone());
        self.tree.set_payload(path, payload.clone());
        self.effects.push(match old_payload {
            Some(old_payload) => SideEffect::NodeUpdated { path: path.clone(), old_payload, payload },
            None => SideEffect::NodeCreated { path: path.clone() },
        });
        let deleted = crate::keep_while::cascade_delete(self.tree, self.keep_while, &[path.clone()]);
        self.effects.extend(
            deleted
                .into_iter()
                .map(|(p, old_payload)| SideEffect::NodeDeleted { path: p, old_payload }),
        );
        Ok(())
    }

    /// Delete the node (and subtree) at `path`, cascading any keep-while
    /// watchers that are invalidated.
    ///
    /// # Errors
    /// `StoreUpdateDenied` inside a read-only transaction.
    pub fn delete(&mut self, path: &Path) -> StoreResult<()> {
        self.require_writable()?;
        if let Some(removed) = self.tree.remove(path) {
            self.keep_while.clear_watcher(path);
            self.effects
                .push(SideEffect::NodeDeleted { path: path.clone(), old_payload: removed.payload });
            let deleted = crate::keep_while::cascade_delete(self.tree, self.keep_while, &[path.clone()]);
            self.effects.extend(
                deleted
                    .into_iter()
                    .map(|(p, old_payload)| SideEffect::NodeDeleted { path: p, old_payload }),
            );
        }
        Ok(())
    }

    /// Explicitly abort the transaction with an application-chosen value.
    /// Equivalent to the function simply returning `TxOutcome::Aborted` --
    /// provided as a convenience so transaction functions can early-return.
    #[must_use]
    pub fn abort(reason: Value) -> TxOutcome {
        TxOutcome::Aborted {
            reason: AbortReason::User(reason),
        }
    }
}

pub type TxFn = Arc<dyn Fn(&mut TxContext) -> TxOutcome + Send + Sync>;

/// Process-local registry of transaction functions, resolved by name at
/// `run` time. Every replica must register the same names to the same
/// (deterministic) functions for `ReadWrite`/`Auto` transactions to stay
/// consistent -- the same requirement `crate::triggers::ProcRegistry` and
/// `crate::projections::FunctionRegistry` place on stored procedures and
/// projection functions.
#[derive(Clone, Default)]
pub struct TxRegistry {
    functions: HashMap<String, TxFn>,
}

impl TxRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: TxFn) {
        self.functions.insert(name.into(), f);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TxFn> {
        self.functions.get(name)
    }
}

/// Run `tx` against `state`, looking its function up in `registry`.
///
/// # Errors
/// `FunctionClause` if `tx.function_name` is not registered.
pub fn run(
    state: &mut State,
    tx: TxRequest,
    registry: &TxRegistry,
) -> StoreResult<(TxOutcome, Vec<SideEffect>)> {
    let Some(f) = registry.get(&tx.function_name) else {
        return Err(StoreError::with_info(
            ErrorKind::FunctionClause,
            crate::info!("function" => tx.function_name),
        ));
    };

    let mut ctx = TxContext {
        tree: &mut state.tree,
        keep_while: &mut state.keep_while,
        read_only: tx.mode == ResolvedTxMode::ReadOnly,
        effects: Vec::new(),
    };
    let outcome = f(&mut ctx);
    let effects = match &outcome {
        TxOutcome::Committed(_) => ctx.effects,
        // An aborted transaction's tree mutations are already applied to
        // `state` (there is no separate staging tree for ReadWrite), so
        // record them identically -- spec §4.F treats abort as "the
        // function chose not to commit its *result*", not as a rollback.
        TxOutcome::Aborted { .. } => ctx.effects,
    };
    Ok((outcome, effects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::NodeIdent;

    #[test]
    fn read_only_transaction_rejects_mutation() {
        let mut state = State::new();
        let mut registry = TxRegistry::new();
        registry.register("try_write", Arc::new(|ctx: &mut TxContext| {
            match ctx.put(&vec![NodeIdent::name("a")], Payload::Data(Value::from(1))) {
                Ok(()) => TxOutcome::Committed(Value::Null),
                Err(e) => TxOutcome::Aborted { reason: AbortReason::Exception(e) },
            }
        }));
        let tx = TxBuilder::new("try_write").read_only().build().unwrap();
        let (outcome, effects) = run(&mut state, tx, &registry).unwrap();
        assert!(effects.is_empty());
        match outcome {
            TxOutcome::Aborted { reason: AbortReason::Exception(e) } => {
                assert_eq!(e.kind, ErrorKind::StoreUpdateDenied);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn read_write_transaction_commits_and_records_effects() {
        let mut state = State::new();
        let mut registry = TxRegistry::new();
        registry.register("write_a", Arc::new(|ctx: &mut TxContext| {
            ctx.put(&vec![NodeIdent::name("a")], Payload::Data(Value::from(42))).unwrap();
            TxOutcome::Committed(Value::from(42))
        }));
        let tx = TxBuilder::new("write_a").read_write().build().unwrap();
        let (outcome, effects) = run(&mut state, tx, &registry).unwrap();
        assert_eq!(outcome, TxOutcome::Committed(Value::from(42)));
        assert_eq!(effects.len(), 1);
        assert!(state.tree.exists(&vec![NodeIdent::name("a")]));
    }

    #[test]
    fn unregistered_function_is_function_clause_error() {
        let mut state = State::new();
        let registry = TxRegistry::new();
        let tx = TxBuilder::new("missing").read_only().build().unwrap();
        let err = run(&mut state, tx, &registry).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FunctionClause);
    }

    #[test]
    fn strict_auto_without_pinned_mode_is_unanalyzable() {
        let err = TxBuilder::new("f").strict().build().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnanalyzableTxFun);
    }

    #[test]
    fn non_strict_auto_defaults_to_read_write() {
        let req = TxBuilder::new("f").build().unwrap();
        assert_eq!(req.mode, ResolvedTxMode::ReadWrite);
    }
}

//! The Public Operation Layer (spec §5): the façade an embedding
//! application actually calls.
//!
//! A small, cheaply `Clone`-able handle (wrapping [`LocalLog`] directly
//! rather than a generic `Log` trait object, since firing
//! triggers/projections after a commit needs
//! direct access to the committed [`State`], which the `Log` contract does
//! not expose) that owns everything needed to turn one call into a
//! committed command plus its side effects: the log itself, the
//! process-local registries `Log::submit` cannot see inside
//! (`ProcRegistry`, `FunctionRegistry`), the view store projections write
//! into, and the store-wide [`StoreConfig`].
//!
//! `Store` is deliberately the *only* place `crate::triggers::fire_triggers`
//! and `crate::projections::apply_projections` are called from in this
//! crate -- every other module only ever produces or consumes
//! `SideEffect`s as data.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config::StoreConfig;
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::log::local_log::LocalLog;
use crate::log::Log;
use crate::options::{CommandOptions, CorrelationId};
use crate::path::{self, PathPattern};
use crate::projections::{self, FunctionRegistry};
use crate::state_machine::{Command, Reply};
use crate::transaction::{TxRegistry, TxRequest, TxOutcome};
use crate::tree::Payload;
use crate::triggers::{self, ProcRegistry};
use crate::view_store::ViewStore;

#[cfg(feature = "metrics")]
use crate::metrics::StoreMetrics;

/// A running replicated tree store: one [`LocalLog`] plus everything
/// needed to dispatch its committed side effects.
#[derive(Clone)]
pub struct Store {
    log: LocalLog,
    config: StoreConfig,
    procs: ProcRegistry,
    functions: FunctionRegistry,
    view_store: Arc<dyn ViewStore>,
    #[cfg(feature = "metrics")]
    metrics: Arc<StoreMetrics>,
    next_correlation: Arc<AtomicU64>,
    async_replies: Arc<Mutex<BTreeMap<CorrelationId, StoreResult<Reply>>>>,
}

impl Store {
    #[must_use]
    pub fn new(
        tx_registry: TxRegistry,
        procs: ProcRegistry,
        functions: FunctionRegistry,
        view_store: Arc<dyn ViewStore>,
        config: StoreConfig,
    ) -> Self {
        #[cfg(feature = "snapshotting")]
        let log = LocalLog::with_snapshot_policy(tx_registry, config.snapshot_policy);
        #[cfg(not(feature = "snapshotting"))]
        let log = LocalLog::new(tx_registry);
        Self {
            log,
            config,
            procs,
            functions,
            view_store,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(StoreMetrics::new()),
            next_correlation: Arc::new(AtomicU64::new(0)),
            async_replies: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Submit `command` without requiring the caller to wait for dispatch
    /// to finish, returning a [`CorrelationId`] redeemable via
    /// [`Self::wait_for`].
    ///
    /// `LocalLog` commits and dispatches synchronously, so the reply is
    /// already known by the time this call returns -- correlation here only
    /// governs *when* the caller picks it up, not whether the commit
    /// itself is deferred. A replicated `Log` would instead resolve the
    /// reply only once consensus lands, at which point `wait_for` would
    /// genuinely block.
    pub fn submit_async(&self, command: Command) -> CorrelationId {
        let id = CorrelationId(self.next_correlation.fetch_add(1, Ordering::Relaxed));
        let result = self.submit(command);
        self.async_replies.lock().unwrap().insert(id, result);
        id
    }

    /// Redeem a [`CorrelationId`] previously returned by
    /// [`Self::submit_async`]. Each id may be redeemed exactly once.
    ///
    /// # Errors
    /// `Timeout` if `correlation` is unknown: never issued by this store,
    /// or already redeemed.
    pub fn wait_for(&self, correlation: CorrelationId) -> StoreResult<Reply> {
        self.async_replies
            .lock()
            .unwrap()
            .remove(&correlation)
            .unwrap_or_else(|| Err(StoreError::new(ErrorKind::Timeout)))
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    fn default_opts(&self) -> CommandOptions {
        CommandOptions::new().with_favor(self.config.default_favor)
    }

    /// Submit `command`, then dispatch any resulting side effects to
    /// triggers and projections before returning the reply.
    fn submit(&self, command: Command) -> StoreResult<Reply> {
        let result = self.log.submit(command);
        #[cfg(feature = "metrics")]
        self.metrics.record_command(result.is_ok());
        let (reply, effects) = result?;
        #[cfg(feature = "metrics")]
        self.metrics.record_effects(&effects);

        self.log.with_state(|state| {
            if self.config.fires_triggers {
                triggers::fire_triggers(state, &effects, &self.procs, self.log.is_leader());
                #[cfg(feature = "metrics")]
                for effect in &effects {
                    if !state.dispatch.triggers_for(effect).is_empty() {
                        self.metrics.record_trigger_firing();
                    }
                }
            }
            projections::apply_projections(state, &effects, &self.functions, self.view_store.as_ref());
            #[cfg(feature = "metrics")]
            for effect in &effects {
                if !state.dispatch.projections_for(effect).is_empty() {
                    self.metrics.record_projection_update();
                }
            }
        });

        Ok(reply)
    }

    /// Write `payload` at the single node `pattern` resolves to, creating
    /// intermediate nodes as needed.
    ///
    /// # Errors
    /// `NotSpecific` if `pattern` is not specific (spec §4.A).
    pub fn put(&self, pattern: &str, payload: Payload, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::Put {
            pattern: path::parse_string(pattern)?,
            payload,
            opts,
        })
    }

    /// Write `payload` at every node `pattern` matches (creating none that
    /// do not already exist -- `PutMany` only ever targets existing
    /// matches of a wildcard, spec §4.E).
    pub fn put_many(&self, pattern: &str, payload: Payload, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::PutMany {
            pattern: path::parse_string(pattern)?,
            payload,
            opts,
        })
    }

    /// # Errors
    /// `Exists` if the node already exists.
    pub fn create(&self, pattern: &str, payload: Payload, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::Create {
            pattern: path::parse_string(pattern)?,
            payload,
            opts,
        })
    }

    /// # Errors
    /// `NodeNotFound` if the node does not already exist; `DeniedUpdate` if
    /// `pattern` resolves to the root.
    pub fn update(&self, pattern: &str, payload: Payload, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::Update {
            pattern: path::parse_string(pattern)?,
            payload,
            opts,
        })
    }

    /// # Errors
    /// `MismatchingNode` if the node's current `payload_version` does not
    /// equal `expected_payload_version`.
    pub fn compare_and_swap(
        &self,
        pattern: &str,
        expected_payload_version: u64,
        payload: Payload,
        opts: CommandOptions,
    ) -> StoreResult<Reply> {
        self.submit(Command::CompareAndSwap {
            pattern: path::parse_string(pattern)?,
            expected_payload_version,
            payload,
            opts,
        })
    }

    /// Read every node `pattern` matches (or exactly one, if
    /// `opts.expect_specific_node` is set). Reads never produce side
    /// effects and are not appended to the log.
    pub fn get(&self, pattern: &str, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::Get {
            pattern: path::parse_string(pattern)?,
            opts,
        })
    }

    /// Convenience over [`Self::get`] with `expecting_specific_node`,
    /// returning just the matched payload.
    ///
    /// # Errors
    /// `NodeNotFound` if `pattern` does not resolve to an existing node.
    pub fn get_one(&self, pattern: &str) -> StoreResult<Payload> {
        match self.get(pattern, self.default_opts().expecting_specific_node())? {
            Reply::Single { props, .. } => Ok(props.payload.unwrap_or_default()),
            _ => Err(StoreError::new(ErrorKind::NodeNotFound)),
        }
    }

    /// Like [`Self::get_one`], but returns `default` instead of an error
    /// when the node does not exist.
    #[must_use]
    pub fn get_or(&self, pattern: &str, default: Value) -> Value {
        match self.get_one(pattern) {
            Ok(Payload::Data(v)) => v,
            _ => default,
        }
    }

    pub fn delete(&self, pattern: &str, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::Delete {
            pattern: path::parse_string(pattern)?,
            opts,
        })
    }

    pub fn delete_many(&self, pattern: &str, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::DeleteMany {
            pattern: path::parse_string(pattern)?,
            opts,
        })
    }

    pub fn delete_payload(&self, pattern: &str, opts: CommandOptions) -> StoreResult<Reply> {
        self.submit(Command::DeletePayload {
            pattern: path::parse_string(pattern)?,
            opts,
        })
    }

    pub fn register_trigger(&self, trigger: crate::dispatch::TriggerSpec) -> StoreResult<Reply> {
        self.submit(Command::RegisterTrigger { trigger })
    }

    pub fn register_projection(&self, projection: crate::dispatch::ProjectionSpec) -> StoreResult<Reply> {
        self.submit(Command::RegisterProjection { projection })
    }

    /// Run a transaction built with [`crate::transaction::TxBuilder`].
    pub fn transaction(&self, tx: TxRequest) -> StoreResult<TxOutcome> {
        match self.submit(Command::RunTransaction { tx })? {
            Reply::TxOutcome(outcome) => Ok(outcome),
            _ => unreachable!("RunTransaction always replies with TxOutcome"),
        }
    }

    /// True if `pattern` resolves to at least one existing node.
    #[must_use]
    pub fn exists(&self, pattern: &str) -> bool {
        self.get(pattern, CommandOptions::new())
            .map(|r| match r {
                Reply::Many(m) => !m.is_empty(),
                Reply::Single { .. } => true,
                _ => false,
            })
            .unwrap_or(false)
    }

    /// True if `pattern` resolves to a single existing node carrying a
    /// `Payload::Data` value.
    #[must_use]
    pub fn has_data(&self, pattern: &str) -> bool {
        matches!(self.get_one(pattern), Ok(Payload::Data(_)))
    }

    /// True if `pattern` resolves to a single existing node carrying a
    /// `Payload::StoredProc`.
    #[must_use]
    pub fn is_sproc(&self, pattern: &str) -> bool {
        matches!(self.get_one(pattern), Ok(Payload::StoredProc(_)))
    }

    /// Number of nodes `pattern` matches.
    #[must_use]
    pub fn count(&self, pattern: &str) -> usize {
        self.get(pattern, CommandOptions::new())
            .map(|r| match r {
                Reply::Many(m) => m.len(),
                Reply::Single { .. } => 1,
                _ => 0,
            })
            .unwrap_or(0)
    }

    /// Expose the underlying [`LocalLog`] for callers that need raw
    /// `submit`/snapshotting access (e.g. `crate::testing`).
    #[must_use]
    pub fn log(&self) -> &LocalLog {
        &self.log
    }
}

/// Parse and validate a path pattern up front, mirroring the error a
/// mis-specified pattern would raise at apply time -- useful for callers
/// that want fail-fast validation before submitting a batch of commands.
///
/// # Errors
/// Propagates any parse error from [`path::parse_string`].
pub fn validate_pattern(pattern: &str) -> StoreResult<PathPattern> {
    path::parse_string(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::view_store::InMemoryViewStore;

    fn new_store() -> Store {
        Store::new(
            TxRegistry::new(),
            ProcRegistry::new(),
            FunctionRegistry::new(),
            Arc::new(InMemoryViewStore::new()),
            StoreConfig::default(),
        )
    }

    #[test]
    fn put_then_get_one_round_trips() {
        let store = new_store();
        store
            .put("/stock/oak", Payload::Data(serde_json::json!(12)), CommandOptions::new())
            .unwrap();
        assert_eq!(store.get_one("/stock/oak").unwrap(), Payload::Data(serde_json::json!(12)));
        assert!(store.has_data("/stock/oak"));
        assert!(store.exists("/stock/oak"));
    }

    #[test]
    fn submit_async_reply_is_redeemable_exactly_once() {
        let store = new_store();
        let id = store.submit_async(Command::Put {
            pattern: path::parse_string("/a").unwrap(),
            payload: Payload::Data(serde_json::json!(1)),
            opts: CommandOptions::new(),
        });
        assert!(store.wait_for(id).is_ok());
        assert_eq!(store.wait_for(id).unwrap_err().kind, ErrorKind::Timeout);
    }

    #[test]
    fn create_rejects_existing_node() {
        let store = new_store();
        store.create("/a", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
        let err = store
            .create("/a", Payload::Data(serde_json::json!(2)), CommandOptions::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Exists);
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let store = new_store();
        assert_eq!(store.get_or("/missing", serde_json::json!("fallback")), serde_json::json!("fallback"));
    }

    #[test]
    fn count_reports_wildcard_match_size() {
        let store = new_store();
        store.put("/stock/oak", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
        store.put("/stock/pine", Payload::Data(serde_json::json!(2)), CommandOptions::new()).unwrap();
        assert_eq!(store.count("/stock/*"), 2);
    }

    #[test]
    fn delete_cascades_keep_while_watchers() {
        let store = new_store();
        store.put("/stock/oak", Payload::Data(serde_json::json!(1)), CommandOptions::new()).unwrap();
        let mut keep_while = std::collections::BTreeMap::new();
        keep_while.insert(
            path::parse_path("/stock/oak").unwrap(),
            crate::path::Condition::NodeExists(true),
        );
        store
            .put(
                "/watchers/low_stock",
                Payload::Data(serde_json::json!(true)),
                CommandOptions::new().with_keep_while(keep_while),
            )
            .unwrap();
        store.delete("/stock/oak", CommandOptions::new()).unwrap();
        assert!(!store.exists("/watchers/low_stock"));
    }
}

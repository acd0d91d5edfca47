//! The deterministic state machine (spec §4.E).
//!
//! [`State`] owns a [`Tree`] and a [`KeepWhileGraph`]. [`State::apply`] is
//! the *only* entry point a `Log` implementation should ever call: it takes
//! a [`Command`], runs it to completion purely as a function of `(state,
//! command) -> (state, Reply, Vec<SideEffect>)`, and returns the side
//! effects as data rather than executing them. Nothing in this module
//! performs I/O, spawns a thread, or consults a clock -- that is the
//! responsibility of whatever drives `apply` (`crate::log::local_log` in
//! this crate) and whatever consumes the returned `SideEffect`s
//! (`crate::dispatch`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::keep_while::{cascade_delete, KeepWhileGraph};
use crate::options::{CommandOptions, PropName};
use crate::path::{Condition, Path, PathPattern};
use crate::tree::{Payload, Tree, TreeNode};
use crate::walker::{resolve_many, resolve_one};

/// A snapshot of the properties a caller asked to have returned for one
/// matched node (spec §4.E, `CommandOptions::props_to_return`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProps {
    pub payload: Option<Payload>,
    pub payload_version: Option<u64>,
    pub child_list_version: Option<u64>,
    pub child_names: Option<Vec<crate::path::NodeIdent>>,
}

fn node_props(node: &TreeNode, opts: &CommandOptions) -> NodeProps {
    let want = |p: PropName| opts.props_to_return.is_empty() && p == PropName::Payload
        || opts.props_to_return.contains(&p);
    NodeProps {
        payload: want(PropName::Payload).then(|| node.payload.clone()),
        payload_version: want(PropName::PayloadVersion).then_some(node.payload_version),
        child_list_version: want(PropName::ChildListVersion).then_some(node.child_list_version),
        child_names: want(PropName::ChildNames)
            .then(|| node.children.keys().cloned().collect()),
    }
}

/// The reply shape for every command. `Single` is used by commands that
/// operate (or report) on exactly one node; `Many` is used by pattern-based
/// reads/writes that can touch several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    #[default]
    Ok,
    Single {
        path: Path,
        props: NodeProps,
    },
    Many(BTreeMap<Path, NodeProps>),
    TxOutcome(crate::transaction::TxOutcome),
}

/// A side effect that must be carried out *outside* the deterministic core:
/// firing triggers/projections, or acknowledging a stored-proc registration.
/// Emitted as data so `apply` remains a pure function (spec §4.E, §4.G).
///
/// `old_payload` on `NodeUpdated`/`NodePayloadCleared`/`NodeDeleted` is the
/// payload immediately before the mutation (`Payload::None` if the node had
/// none) -- carried so `Extended` projections can see both sides of a
/// change without re-reading the tree, which by the time dispatch runs
/// already reflects the new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SideEffect {
    NodeCreated { path: Path },
    NodeUpdated { path: Path, old_payload: Payload, payload: Payload },
    NodePayloadCleared { path: Path, old_payload: Payload },
    NodeDeleted { path: Path, old_payload: Payload },
    TriggerRegistered { id: crate::dispatch::TriggerId },
    ProjectionRegistered { name: String },
}

/// A single deterministic command. Every variant carries everything needed
/// to re-derive its effect from `(State, Command)` alone -- no wall clock,
/// no randomness, no external registry lookups beyond what the command
/// itself names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Put {
        pattern: PathPattern,
        payload: Payload,
        opts: CommandOptions,
    },
    PutMany {
        pattern: PathPattern,
        payload: Payload,
        opts: CommandOptions,
    },
    Create {
        pattern: PathPattern,
        payload: Payload,
        opts: CommandOptions,
    },
    Update {
        pattern: PathPattern,
        payload: Payload,
        opts: CommandOptions,
    },
    CompareAndSwap {
        pattern: PathPattern,
        expected_payload_version: u64,
        payload: Payload,
        opts: CommandOptions,
    },
    Get {
        pattern: PathPattern,
        opts: CommandOptions,
    },
    Delete {
        pattern: PathPattern,
        opts: CommandOptions,
    },
    DeleteMany {
        pattern: PathPattern,
        opts: CommandOptions,
    },
    DeletePayload {
        pattern: PathPattern,
        opts: CommandOptions,
    },
    RegisterTrigger {
        trigger: crate::dispatch::TriggerSpec,
    },
    RegisterProjection {
        projection: crate::dispatch::ProjectionSpec,
    },
    RunTransaction {
        tx: crate::transaction::TxRequest,
    },
}

/// Owns the tree and the keep-while graph. Dispatcher registrations
/// (triggers/projections) are also carried here since they must replay
/// identically on every replica (spec §4.G).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub tree: Tree,
    pub keep_while: KeepWhileGraph,
    pub dispatch: crate::dispatch::Dispatcher,
}

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command, returning the reply and any side effects the
    /// caller must carry out afterward.
    ///
    /// `tx_registry` is only consulted for `Command::RunTransaction`; every
    /// other variant ignores it. It is threaded through `apply` rather than
    /// stashed on `State` because it holds process-local closures that must
    /// never be part of the replicated, serializable state (the same
    /// reason `crate::triggers::ProcRegistry` and
    /// `crate::projections::FunctionRegistry` are passed in at call time
    /// rather than owned by `State`).
    ///
    /// # Errors
    /// Returns a [`StoreError`] for any condition named in spec §7
    /// (`NodeNotFound`, `NotSpecific`, `Exists`, `DeniedUpdate`, ...).
    pub fn apply(
        &mut self,
        command: Command,
        tx_registry: &crate::transaction::TxRegistry,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        match command {
            Command::Put { pattern, payload, opts } => self.put(&pattern, payload, &opts, false),
            Command::PutMany { pattern, payload, opts } => self.put(&pattern, payload, &opts, true),
            Command::Create { pattern, payload, opts } => self.create(&pattern, payload, &opts),
            Command::Update { pattern, payload, opts } => self.update(&pattern, payload, &opts),
            Command::CompareAndSwap {
                pattern,
                expected_payload_version,
                payload,
                opts,
            } => self.compare_and_swap(&pattern, expected_payload_version, payload, &opts),
            Command::Get { pattern, opts } => self.get(&pattern, &opts),
            Command::Delete { pattern, opts } => self.delete(&pattern, &opts, false),
            Command::DeleteMany { pattern, opts } => self.delete(&pattern, &opts, true),
            Command::DeletePayload { pattern, opts } => self.delete_payload(&pattern, &opts),
            Command::RegisterTrigger { trigger } => {
                let id = trigger.id.clone();
                self.dispatch.register_trigger(trigger)?;
                Ok((Reply::Ok, vec![SideEffect::TriggerRegistered { id }]))
            }
            Command::RegisterProjection { projection } => {
                let name = projection.name.clone();
                let retro = self.dispatch.register_projection(projection, &self.tree)?;
                let mut effects = vec![SideEffect::ProjectionRegistered { name }];
                effects.extend(retro);
                Ok((Reply::Ok, effects))
            }
            Command::RunTransaction { tx } => {
                let (outcome, effects) = crate::transaction::run(self, tx, tx_registry)?;
                Ok((Reply::TxOutcome(outcome), effects))
            }
        }
    }

    fn install_keep_while(&mut self, target: &Path, opts: &CommandOptions) {
        if let Some(watches) = &opts.keep_while {
            self.keep_while.set_watches(target.clone(), watches.clone());
        }
    }

    fn emit_reply(&self, path: &Path, opts: &CommandOptions) -> Reply {
        match self.tree.get(path) {
            Some(node) => Reply::Single {
                path: path.clone(),
                props: node_props(node, opts),
            },
            None => Reply::Ok,
        }
    }

    fn cascade(&mut self, changed: Vec<Path>) -> Vec<SideEffect> {
        let deleted = cascade_delete(&mut self.tree, &mut self.keep_while, &changed);
        deleted
            .into_iter()
            .map(|(path, old_payload)| SideEffect::NodeDeleted { path, old_payload })
            .collect()
    }

    fn put(
        &mut self,
        pattern: &PathPattern,
        payload: Payload,
        opts: &CommandOptions,
        many: bool,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        if many {
            let matches = resolve_many(&self.tree, pattern)?;
            let mut out = BTreeMap::new();
            let mut effects = Vec::new();
            let mut changed = Vec::new();
            for m in matches {
                let old_payload = self.tree.get(&m.path).map(|n| n.payload.clone());
                self.tree.set_payload(&m.path, payload.clone());
                self.install_keep_while(&m.path, opts);
                effects.push(match old_payload {
                    Some(old_payload) => SideEffect::NodeUpdated { path: m.path.clone(), old_payload, payload: payload.clone() },
                    None => SideEffect::NodeCreated { path: m.path.clone() },
                });
                out.insert(m.path.clone(), node_props(self.tree.get(&m.path).unwrap(), opts));
                changed.push(m.path);
            }
            effects.extend(self.cascade(changed));
            Ok((Reply::Many(out), effects))
        } else {
            let res = resolve_one(&self.tree, pattern)?;
            let old_payload = (res.ancestors_exist && self.tree.exists(&res.path))
                .then(|| self.tree.get(&res.path).unwrap().payload.clone());
            self.tree.set_payload(&res.path, payload.clone());
            self.install_keep_while(&res.path, opts);
            let mut effects = vec![match old_payload {
                Some(old_payload) => SideEffect::NodeUpdated { path: res.path.clone(), old_payload, payload },
                None => SideEffect::NodeCreated { path: res.path.clone() },
            }];
            effects.extend(self.cascade(vec![res.path.clone()]));
            Ok((self.emit_reply(&res.path, opts), effects))
        }
    }

    fn create(
        &mut self,
        pattern: &PathPattern,
        payload: Payload,
        opts: &CommandOptions,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        // The root always exists and is never a `create` target; `combine`
        // has no literal/sibling to wrap an empty pattern around, so this
        // must be caught before it is turned into a non-specific condition.
        if pattern.is_empty() {
            return Err(StoreError::with_info(
                ErrorKind::Exists,
                crate::info!("path" => "/"),
            ));
        }
        let pattern = crate::path::combine(pattern, vec![Condition::NodeExists(false)]);
        let res = resolve_one(&self.tree, &pattern)?;
        if !res.matched {
            return Err(StoreError::with_info(
                ErrorKind::Exists,
                crate::info!("path" => crate::path::render(&pattern)),
            ));
        }
        self.tree.set_payload(&res.path, payload);
        self.install_keep_while(&res.path, opts);
        let mut effects = vec![SideEffect::NodeCreated { path: res.path.clone() }];
        effects.extend(self.cascade(vec![res.path.clone()]));
        Ok((self.emit_reply(&res.path, opts), effects))
    }

    fn update(
        &mut self,
        pattern: &PathPattern,
        payload: Payload,
        opts: &CommandOptions,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        // Same reasoning as `create`: an empty pattern never reaches
        // `resolve_one` with an empty result once `combine` has appended a
        // structural condition, so the root must be denied up front.
        if pattern.is_empty() {
            return Err(StoreError::new(ErrorKind::DeniedUpdate));
        }
        let combined = crate::path::combine(pattern, vec![Condition::NodeExists(true)]);
        let res = resolve_one(&self.tree, &combined)?;
        if !res.matched {
            return Err(StoreError::new(ErrorKind::NodeNotFound));
        }
        let old_payload = self.tree.get(&res.path).unwrap().payload.clone();
        self.tree.set_payload(&res.path, payload.clone());
        self.install_keep_while(&res.path, opts);
        let mut effects = vec![SideEffect::NodeUpdated { path: res.path.clone(), old_payload, payload }];
        effects.extend(self.cascade(vec![res.path.clone()]));
        Ok((self.emit_reply(&res.path, opts), effects))
    }

    fn compare_and_swap(
        &mut self,
        pattern: &PathPattern,
        expected_payload_version: u64,
        payload: Payload,
        opts: &CommandOptions,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        // `combine` cannot wrap a version condition around an empty
        // pattern, so the root's own version is checked directly here
        // rather than being folded into a (non-specific) condition.
        if pattern.is_empty() {
            if self.tree.root.payload_version != expected_payload_version {
                return Err(StoreError::with_info(
                    ErrorKind::MismatchingNode,
                    crate::info!("expected_payload_version" => expected_payload_version),
                ));
            }
            let old_payload = self.tree.root.payload.clone();
            self.tree.set_payload(&[], payload.clone());
            self.install_keep_while(&Vec::new(), opts);
            let mut effects = vec![SideEffect::NodeUpdated { path: Vec::new(), old_payload, payload }];
            effects.extend(self.cascade(vec![Vec::new()]));
            return Ok((self.emit_reply(&Vec::new(), opts), effects));
        }
        let combined = crate::path::combine(
            pattern,
            vec![Condition::PayloadVersionEquals(expected_payload_version)],
        );
        let res = resolve_one(&self.tree, &combined)?;
        if !res.matched {
            return Err(StoreError::with_info(
                ErrorKind::MismatchingNode,
                crate::info!("expected_payload_version" => expected_payload_version),
            ));
        }
        let old_payload = self.tree.get(&res.path).unwrap().payload.clone();
        self.tree.set_payload(&res.path, payload.clone());
        self.install_keep_while(&res.path, opts);
        let mut effects = vec![SideEffect::NodeUpdated { path: res.path.clone(), old_payload, payload }];
        effects.extend(self.cascade(vec![res.path.clone()]));
        Ok((self.emit_reply(&res.path, opts), effects))
    }

    fn get(&self, pattern: &PathPattern, opts: &CommandOptions) -> StoreResult<(Reply, Vec<SideEffect>)> {
        if opts.expect_specific_node {
            let res = resolve_one(&self.tree, pattern)?;
            if !res.matched {
                return Err(StoreError::new(ErrorKind::NodeNotFound));
            }
            return Ok((self.emit_reply(&res.path, opts), Vec::new()));
        }
        let matches = resolve_many(&self.tree, pattern)?;
        let mut out = BTreeMap::new();
        for m in matches {
            if m.path.is_empty() && !opts.include_root_props {
                continue;
            }
            if let Some(node) = self.tree.get(&m.path) {
                out.insert(m.path, node_props(node, opts));
            }
        }
        Ok((Reply::Many(out), Vec::new()))
    }

    fn delete(
        &mut self,
        pattern: &PathPattern,
        opts: &CommandOptions,
        many: bool,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        let targets: Vec<Path> = if many {
            resolve_many(&self.tree, pattern)?.into_iter().map(|m| m.path).collect()
        } else {
            let res = resolve_one(&self.tree, pattern)?;
            if !res.matched {
                return Err(StoreError::new(ErrorKind::NodeNotFound));
            }
            vec![res.path]
        };

        let mut effects = Vec::new();
        let mut changed = Vec::new();
        for path in &targets {
            if path.is_empty() {
                return Err(StoreError::new(ErrorKind::DeniedUpdate));
            }
            if let Some(removed) = self.tree.remove(path) {
                self.keep_while.clear_watcher(path);
                effects.push(SideEffect::NodeDeleted { path: path.clone(), old_payload: removed.payload });
                changed.push(path.clone());
            }
        }
        effects.extend(self.cascade(changed));

        let _ = opts;
        Ok((Reply::Ok, effects))
    }

    fn delete_payload(
        &mut self,
        pattern: &PathPattern,
        opts: &CommandOptions,
    ) -> StoreResult<(Reply, Vec<SideEffect>)> {
        let res = resolve_one(&self.tree, pattern)?;
        if !res.matched {
            return Err(StoreError::new(ErrorKind::NodeNotFound));
        }
        let old_payload = self.tree.get(&res.path).unwrap().payload.clone();
        self.tree.clear_payload(&res.path);
        let mut effects = vec![SideEffect::NodePayloadCleared { path: res.path.clone(), old_payload }];
        effects.extend(self.cascade(vec![res.path.clone()]));
        Ok((self.emit_reply(&res.path, opts), effects))
    }
}

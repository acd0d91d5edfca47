//! Trigger firing (spec §4.G).
//!
//! Stored procedures are registered locally, by name, before the store
//! starts serving commands -- the deterministic core only ever remembers
//! *which* stored-proc node a trigger points at (`crate::dispatch::TriggerSpec`).
//! [`fire_triggers`] is what actually calls them, and it is the one place
//! the "leader-only, at-least-once" delivery rule and error isolation from
//! spec §4.G are implemented: a failing stored procedure is logged and
//! skipped, never allowed to roll back the mutation that produced it or
//! crash the caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::EventAction;
use crate::path::Path;
use crate::state_machine::{SideEffect, State};
use crate::tree::Payload;

/// What a stored procedure sees when its trigger fires.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub path: Path,
    pub action: EventAction,
    pub payload: Option<Payload>,
}

pub type ProcFn = Arc<dyn Fn(&TriggerContext) + Send + Sync>;

/// Process-local registry mapping a stored procedure's name (the string
/// carried in a `Payload::StoredProc`) to the closure that runs it.
#[derive(Clone, Default)]
pub struct ProcRegistry {
    procs: HashMap<String, ProcFn>,
}

impl ProcRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: ProcFn) {
        self.procs.insert(name.into(), f);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProcFn> {
        self.procs.get(name)
    }
}

fn payload_of(effect: &SideEffect) -> Option<Payload> {
    match effect {
        SideEffect::NodeUpdated { payload, .. } => Some(payload.clone()),
        _ => None,
    }
}

/// Fire every trigger matching `effects`, in priority order, invoking the
/// stored procedure named at each trigger's `sproc_path`.
///
/// Only the leader fires triggers (followers observe the same committed
/// entries but must not duplicate side effects); callers that are not the
/// leader should not call this at all, but `leader` is taken explicitly so
/// a single code path can be unit tested both ways. A trigger whose target
/// node is missing, not a stored procedure, or whose name is unregistered
/// is logged and skipped -- it never aborts the remaining triggers.
pub fn fire_triggers(state: &State, effects: &[SideEffect], registry: &ProcRegistry, leader: bool) {
    if !leader {
        return;
    }
    for effect in effects {
        for trig in state.dispatch.triggers_for(effect) {
            let Some(node) = state.tree.get(&trig.sproc_path) else {
                tracing::warn!(trigger = %trig.id.0, "stored procedure node missing, skipping");
                continue;
            };
            let Payload::StoredProc(name) = &node.payload else {
                tracing::warn!(trigger = %trig.id.0, "target node is not a stored procedure");
                continue;
            };
            let Some(f) = registry.get(name) else {
                tracing::error!(trigger = %trig.id.0, proc = %name, "no function clause matching registered stored procedure");
                continue;
            };
            let ctx = TriggerContext {
                path: EventAction::path_of(effect).cloned().unwrap_or_default(),
                action: EventAction::of(effect).expect("triggers_for only returns tree events"),
                payload: payload_of(effect),
            };
            f(&ctx);
        }
    }
}

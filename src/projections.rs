//! Projection application (spec §4.G).
//!
//! A projection's function is registered locally (by name) exactly like a
//! trigger's stored procedure; [`apply_projections`] is what evaluates it
//! and writes the result into a [`ViewStore`]. Stored-procedure payloads
//! are never projected -- they carry no data a view could meaningfully
//! hold. Unlike triggers, projections are *not* leader-only: every replica
//! keeps its own view store in sync with its own copy of the tree.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::{EventAction, ProjectionKind, ViewType};
use crate::path::Path;
use crate::state_machine::{SideEffect, State};
use crate::tree::Payload;
use crate::view_store::ViewStore;

/// What a `Simple` projection function sees: the matched node's own new
/// payload, plus enough of the event to distinguish a create from an
/// update if the function cares to.
#[derive(Debug, Clone)]
pub struct ProjectionEvent {
    pub path: Path,
    pub action: EventAction,
    pub payload: Option<Value>,
}

/// What an `Extended` projection function uses to write into its own view.
/// Bundles the view store with the projection's own name so the closure's
/// arity matches spec §4.G's `(view, path, old_props, new_props) -> ()` --
/// the name never needs to be threaded through by hand.
pub struct ViewHandle<'a> {
    store: &'a dyn ViewStore,
    name: &'a str,
}

impl ViewHandle<'_> {
    pub fn put(&self, path: &Path, view_type: ViewType, value: Value) {
        self.store.put(self.name, path, view_type, value);
    }

    pub fn remove(&self, path: &Path) {
        self.store.remove(self.name, path);
    }

    pub fn remove_value(&self, path: &Path, value: &Value) {
        self.store.remove_value(self.name, path, value);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Vec<Value>> {
        self.store.get(self.name, path)
    }
}

pub type SimpleProjectionFn = Arc<dyn Fn(&ProjectionEvent) -> Option<Value> + Send + Sync>;

/// `old_props`/`new_props` are `None` exactly when the node has no payload
/// on that side of the mutation (absent before a create, absent after a
/// delete) -- the function decides entirely on its own what to do with the
/// view, including partial updates a single returned value could never
/// express (e.g. a bag's symmetric difference between old and new data).
pub type ExtendedProjectionFn =
    Arc<dyn Fn(&ViewHandle, &Path, Option<&Value>, Option<&Value>) + Send + Sync>;

/// A registered projection function, in whichever shape its declared
/// `ProjectionKind` requires.
#[derive(Clone)]
pub enum ProjectionFn {
    Simple(SimpleProjectionFn),
    Extended(ExtendedProjectionFn),
}

/// Process-local registry mapping a projection's `function_name` to the
/// closure that maintains its view. `Simple` and `Extended` projections
/// (spec §4.G) share this registry; [`apply_projections`] picks the
/// variant matching the projection's declared `ProjectionKind`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ProjectionFn>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: ProjectionFn) {
        self.functions.insert(name.into(), f);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProjectionFn> {
        self.functions.get(name)
    }
}

fn old_payload_of(effect: &SideEffect) -> Option<&Payload> {
    match effect {
        SideEffect::NodeUpdated { old_payload, .. }
        | SideEffect::NodePayloadCleared { old_payload, .. }
        | SideEffect::NodeDeleted { old_payload, .. } => Some(old_payload),
        SideEffect::NodeCreated { .. }
        | SideEffect::TriggerRegistered { .. }
        | SideEffect::ProjectionRegistered { .. } => None,
    }
}

/// Apply every projection matching `effects` to `view_store`.
///
/// `Simple` projections: a `Delete` event removes the corresponding view
/// entry rather than invoking the function; otherwise the function is
/// called with the node's new payload and its return value (if any)
/// overwrites or accumulates into the view per `ProjectionOptions::view_type`.
///
/// `Extended` projections: the function is invoked on every matching event,
/// including `Delete` (with `new_props` as `None`), and is handed the view
/// store itself -- it is responsible for its own reads, writes and removals.
///
/// A missing function registration, or a registered function whose shape
/// doesn't match the projection's declared kind, is logged and skipped --
/// never allowed to abort the remaining projections or the mutation that
/// produced the event.
pub fn apply_projections(
    state: &State,
    effects: &[SideEffect],
    registry: &FunctionRegistry,
    view_store: &dyn ViewStore,
) {
    for effect in effects {
        for proj in state.dispatch.projections_for(effect) {
            let Some(path) = EventAction::path_of(effect) else { continue };
            let Some(action) = EventAction::of(effect) else { continue };

            if let Some(node) = state.tree.get(path) {
                if node.payload.is_sproc() {
                    continue;
                }
            }

            let Some(f) = registry.get(&proj.function_name) else {
                tracing::error!(projection = %proj.name, function = %proj.function_name, "no function clause matching registered projection function");
                continue;
            };

            match (proj.kind, f) {
                (ProjectionKind::Simple, ProjectionFn::Simple(f)) => {
                    if action == EventAction::Delete {
                        view_store.remove(&proj.name, path);
                        continue;
                    }
                    let payload = state.tree.get(path).and_then(|n| n.payload.data().cloned());
                    let event = ProjectionEvent { path: path.clone(), action, payload };
                    match f(&event) {
                        Some(value) => view_store.put(&proj.name, path, proj.options.view_type, value),
                        None => tracing::debug!(projection = %proj.name, path = ?path, "projection function returned no value"),
                    }
                }
                (ProjectionKind::Extended, ProjectionFn::Extended(f)) => {
                    let old_props = old_payload_of(effect).and_then(Payload::data);
                    let new_props = if action == EventAction::Delete {
                        None
                    } else {
                        state.tree.get(path).and_then(|n| n.payload.data())
                    };
                    let handle = ViewHandle { store: view_store, name: &proj.name };
                    f(&handle, path, old_props, new_props);
                }
                (kind, _) => {
                    tracing::error!(projection = %proj.name, function = %proj.function_name, ?kind, "registered function shape does not match projection kind");
                }
            }
        }
    }
}

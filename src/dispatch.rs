//! Trigger & projection registration bookkeeping (spec §4.G).
//!
//! What actually executes when a [`crate::state_machine::SideEffect`] fires
//! is deliberately kept out of the replicated state: a trigger names a
//! stored-procedure node to invoke, and a projection names a function
//! registered locally by the embedding application (`crate::triggers`,
//! `crate::projections`). Every replica is assumed to register the same
//! function names before joining, the same way any process-local closure
//! registry requires the process that built it to have registered the
//! matching names up front.
//!
//! [`Dispatcher`] only remembers *what was registered and where it
//! applies*; `State::apply` uses it to know which side effects exist, and
//! `crate::triggers`/`crate::projections` use it to know which stored
//! procedures/functions to actually invoke.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::path::{Path, PathPattern};
use crate::state_machine::SideEffect;
use crate::tree::Tree;
use crate::walker::resolve_many;

/// Stable identifier for a registered trigger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub String);

impl TriggerId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// The class of tree mutation a trigger or projection cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventAction {
    Create,
    Update,
    Delete,
    PayloadCleared,
}

impl EventAction {
    #[must_use]
    pub fn of(effect: &SideEffect) -> Option<Self> {
        match effect {
            SideEffect::NodeCreated { .. } => Some(Self::Create),
            SideEffect::NodeUpdated { .. } => Some(Self::Update),
            SideEffect::NodeDeleted { .. } => Some(Self::Delete),
            SideEffect::NodePayloadCleared { .. } => Some(Self::PayloadCleared),
            SideEffect::TriggerRegistered { .. } | SideEffect::ProjectionRegistered { .. } => None,
        }
    }

    #[must_use]
    pub fn path_of(effect: &SideEffect) -> Option<&Path> {
        match effect {
            SideEffect::NodeCreated { path }
            | SideEffect::NodeUpdated { path, .. }
            | SideEffect::NodeDeleted { path, .. }
            | SideEffect::NodePayloadCleared { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// A registered trigger: fires its `sproc_path`'s stored procedure whenever
/// a matching event occurs. At-least-once, leader-only delivery is a
/// property of the runtime (`crate::triggers::TriggerRunner`), not of this
/// bookkeeping struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub id: TriggerId,
    pub pattern: PathPattern,
    pub actions: BTreeSet<EventAction>,
    /// Higher fires first when multiple triggers match the same event.
    pub priority: i32,
    /// Path to the `Payload::StoredProc` node invoked on a match.
    pub sproc_path: Path,
}

/// Whether a projection's registered function returns a single value for
/// the dispatcher to store (`Simple`) or is handed the view store directly,
/// along with the node's payload/version before and after the mutation, and
/// writes into it itself (`Extended`) -- the only shape that can express a
/// computation spanning more than one view row per event, e.g. replacing a
/// bag's members with a symmetric difference of old and new payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionKind {
    Simple,
    Extended,
}

/// Whether a projection's view store treats (path, value) as keyed by path
/// (overwriting) or accumulates every value ever projected for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewType {
    #[default]
    Set,
    Bag,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionOptions {
    pub view_type: ViewType,
    pub read_concurrency: bool,
    pub write_concurrency: bool,
}

/// A registered projection: keeps `crate::view_store::ViewStore` entries
/// under `name` synchronized with every node matching `pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub name: String,
    pub pattern: PathPattern,
    pub kind: ProjectionKind,
    /// Looked up by the application-supplied function registry at fire
    /// time; never invoked from inside this module.
    pub function_name: String,
    pub options: ProjectionOptions,
}

/// Registration bookkeeping for triggers and projections. Replicated as
/// part of `crate::state_machine::State`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dispatcher {
    /// Registration order doubles as the tie-break order `triggers_for`
    /// falls back to when two matching triggers share a priority -- a
    /// `Vec` (rather than a map keyed by `TriggerId`) is what keeps that
    /// order available without a separate sequence counter.
    pub triggers: Vec<TriggerSpec>,
    pub projections: BTreeMap<String, ProjectionSpec>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, spec: TriggerSpec) -> StoreResult<()> {
        if self.triggers.iter().any(|t| t.id == spec.id) {
            return Err(StoreError::with_info(
                ErrorKind::Exists,
                crate::info!("trigger_id" => spec.id.0.clone()),
            ));
        }
        self.triggers.push(spec);
        Ok(())
    }

    /// Register a projection, synthesizing `NodeCreated` side effects for
    /// every node already in `tree` that the projection's pattern matches
    /// (spec §4.G, retroactive registration) so the caller can apply the
    /// projection function to pre-existing state exactly as it would to a
    /// freshly created node. Stored-procedure payloads are excluded --
    /// projections never see stored procedures.
    pub fn register_projection(
        &mut self,
        spec: ProjectionSpec,
        tree: &Tree,
    ) -> StoreResult<Vec<SideEffect>> {
        if self.projections.contains_key(&spec.name) {
            return Err(StoreError::with_info(
                ErrorKind::Exists,
                crate::info!("projection" => spec.name.clone()),
            ));
        }
        let matches = resolve_many(tree, &spec.pattern)?;
        let mut effects = Vec::new();
        for m in matches {
            if let Some(node) = tree.get(&m.path) {
                if !node.payload.is_sproc() {
                    effects.push(SideEffect::NodeCreated { path: m.path });
                }
            }
        }
        self.projections.insert(spec.name.clone(), spec);
        Ok(effects)
    }

    /// Triggers matching `effect`'s path and action, in descending priority
    /// order, ties broken by registration order (`self.triggers`'s own
    /// order, preserved by `sort_by`'s stability).
    #[must_use]
    pub fn triggers_for(&self, effect: &SideEffect) -> Vec<&TriggerSpec> {
        let (Some(action), Some(path)) = (EventAction::of(effect), EventAction::path_of(effect)) else {
            return Vec::new();
        };
        let mut matched: Vec<&TriggerSpec> = self
            .triggers
            .iter()
            .filter(|t| t.actions.contains(&action) && pattern_matches_path(&t.pattern, path))
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Projections whose pattern matches `effect`'s path. Stored-proc
    /// payloads are filtered out by the caller (`crate::projections`)
    /// before invoking the projection function.
    #[must_use]
    pub fn projections_for(&self, effect: &SideEffect) -> Vec<&ProjectionSpec> {
        let Some(path) = EventAction::path_of(effect) else {
            return Vec::new();
        };
        self.projections
            .values()
            .filter(|p| pattern_matches_path(&p.pattern, path))
            .collect()
    }
}

fn pattern_matches_path(pattern: &PathPattern, path: &Path) -> bool {
    // A literal path either is or is not produced by walking the pattern
    // against a single-node probe tree; reusing `resolve_many` against the
    // live tree at fire time would require a full re-walk per event, so
    // instead we match structurally component-by-component, which is
    // exactly what the walker does internally minus the tree lookups.
    fn go(components: &[crate::path::Component], path: &[crate::path::NodeIdent]) -> bool {
        use crate::path::Component;
        match components.split_first() {
            None => path.is_empty(),
            Some((Component::WildcardAnyDepth, rest)) => {
                go(rest, path) || (!path.is_empty() && go(components, &path[1..]))
            }
            Some((_, _)) if path.is_empty() => false,
            Some((Component::Literal(id), rest)) => path[0] == *id && go(rest, &path[1..]),
            Some((Component::WildcardOne, rest)) => go(rest, &path[1..]),
            Some((Component::Cond(cond), rest)) => {
                // Fire-time matching has no node to test structural
                // conditions against; a bare name-equals (from `combine`)
                // is still honored, anything else is treated as "don't
                // gate on this" to avoid silently dropping events.
                let holds = match cond {
                    crate::path::Condition::NameEquals(id) => path[0] == *id,
                    _ => true,
                };
                holds && go(rest, &path[1..])
            }
        }
    }
    go(pattern, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_string;
    use crate::tree::{Payload, Tree};

    #[test]
    fn register_trigger_rejects_duplicate_id() {
        let mut d = Dispatcher::new();
        let spec = TriggerSpec {
            id: TriggerId::new("t1"),
            pattern: parse_string("/stock/**").unwrap(),
            actions: BTreeSet::from([EventAction::Update]),
            priority: 0,
            sproc_path: vec![crate::path::NodeIdent::name("procs"), crate::path::NodeIdent::name("restock")],
        };
        d.register_trigger(spec.clone()).unwrap();
        let err = d.register_trigger(spec).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Exists);
    }

    #[test]
    fn register_projection_synthesizes_retroactive_creates() {
        let mut tree = Tree::new();
        tree.set_payload(
            &vec![crate::path::NodeIdent::name("stock"), crate::path::NodeIdent::name("oak")],
            Payload::Data(serde_json::json!(5)),
        );
        let mut d = Dispatcher::new();
        let spec = ProjectionSpec {
            name: "by_stock".into(),
            pattern: parse_string("/stock/*").unwrap(),
            kind: ProjectionKind::Simple,
            function_name: "project_stock".into(),
            options: ProjectionOptions::default(),
        };
        let effects = d.register_projection(spec, &tree).unwrap();
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], SideEffect::NodeCreated { path } if path == &vec![crate::path::NodeIdent::name("stock"), crate::path::NodeIdent::name("oak")]));
    }

    #[test]
    fn triggers_for_filters_by_action_and_pattern_and_sorts_by_priority_descending() {
        let mut d = Dispatcher::new();
        d.register_trigger(TriggerSpec {
            id: TriggerId::new("low"),
            pattern: parse_string("/stock/**").unwrap(),
            actions: BTreeSet::from([EventAction::Delete]),
            priority: 1,
            sproc_path: vec![],
        }).unwrap();
        d.register_trigger(TriggerSpec {
            id: TriggerId::new("high"),
            pattern: parse_string("/stock/**").unwrap(),
            actions: BTreeSet::from([EventAction::Delete]),
            priority: 5,
            sproc_path: vec![],
        }).unwrap();

        let effect = SideEffect::NodeDeleted { path: vec![crate::path::NodeIdent::name("stock"), crate::path::NodeIdent::name("oak")], old_payload: Payload::None };
        let matched = d.triggers_for(&effect);
        assert_eq!(matched.iter().map(|t| t.id.0.as_str()).collect::<Vec<_>>(), vec!["high", "low"]);
    }

    #[test]
    fn triggers_for_breaks_priority_ties_by_registration_order() {
        let mut d = Dispatcher::new();
        for id in ["first", "second", "third"] {
            d.register_trigger(TriggerSpec {
                id: TriggerId::new(id),
                pattern: parse_string("/stock/**").unwrap(),
                actions: BTreeSet::from([EventAction::Delete]),
                priority: 0,
                sproc_path: vec![],
            }).unwrap();
        }

        let effect = SideEffect::NodeDeleted { path: vec![crate::path::NodeIdent::name("stock"), crate::path::NodeIdent::name("oak")], old_payload: Payload::None };
        let matched = d.triggers_for(&effect);
        assert_eq!(matched.iter().map(|t| t.id.0.as_str()).collect::<Vec<_>>(), vec!["first", "second", "third"]);
    }
}

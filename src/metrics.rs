//! Store metrics (feature `metrics`): a small collector the caller owns
//! and reads from, rather than a global registry. [`StoreMetrics`] tracks
//! commands applied, trigger firings, projection updates, and keep-while
//! cascade sizes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};

use crate::state_machine::SideEffect;

/// Atomically-updated counters describing store activity. Cheap to clone
/// (an `Arc` is not required: every field is independently atomic, and the
/// struct is typically held behind a single shared reference for the
/// lifetime of a `Store`).
#[derive(Debug, Default)]
pub struct StoreMetrics {
    commands_applied: AtomicU64,
    commands_failed: AtomicU64,
    nodes_created: AtomicU64,
    nodes_updated: AtomicU64,
    nodes_deleted: AtomicU64,
    trigger_firings: AtomicU64,
    projection_updates: AtomicU64,
    cascade_deletions: AtomicU64,
}

impl StoreMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&self, ok: bool) {
        if ok {
            self.commands_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fold a batch of side effects from one `State::apply` call into the
    /// counters, distinguishing plain deletions from keep-while cascade
    /// deletions is the caller's job -- `record_effects` counts everything
    /// as a plain mutation; call [`Self::record_cascade`] separately with
    /// the cascade's own length when one occurred.
    pub fn record_effects(&self, effects: &[SideEffect]) {
        for effect in effects {
            match effect {
                SideEffect::NodeCreated { .. } => {
                    self.nodes_created.fetch_add(1, Ordering::Relaxed);
                }
                SideEffect::NodeUpdated { .. } => {
                    self.nodes_updated.fetch_add(1, Ordering::Relaxed);
                }
                SideEffect::NodeDeleted { .. } => {
                    self.nodes_deleted.fetch_add(1, Ordering::Relaxed);
                }
                SideEffect::NodePayloadCleared { .. }
                | SideEffect::TriggerRegistered { .. }
                | SideEffect::ProjectionRegistered { .. } => {}
            }
        }
    }

    pub fn record_cascade(&self, deleted_count: u64) {
        if deleted_count > 0 {
            self.cascade_deletions.fetch_add(deleted_count, Ordering::Relaxed);
        }
    }

    pub fn record_trigger_firing(&self) {
        self.trigger_firings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_projection_update(&self) {
        self.projection_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current counters as JSON, suitable for logging or export.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "commands_applied": self.commands_applied.load(Ordering::Relaxed),
            "commands_failed": self.commands_failed.load(Ordering::Relaxed),
            "nodes_created": self.nodes_created.load(Ordering::Relaxed),
            "nodes_updated": self.nodes_updated.load(Ordering::Relaxed),
            "nodes_deleted": self.nodes_deleted.load(Ordering::Relaxed),
            "trigger_firings": self.trigger_firings.load(Ordering::Relaxed),
            "projection_updates": self.projection_updates.load(Ordering::Relaxed),
            "cascade_deletions": self.cascade_deletions.load(Ordering::Relaxed),
        })
    }
}

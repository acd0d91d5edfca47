//! The View Store contract (spec §4.G, §6): an external key/value store
//! projections write into. A `ViewStore` implementation has no knowledge of
//! the tree, patterns, or the dispatcher -- it only knows how to hold a
//! `Set` (overwrite-by-path) or `Bag` (accumulate-by-path) of JSON values
//! per projection name.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::dispatch::ViewType;
use crate::path::Path;

/// Storage backing one or more projections, keyed by projection name then
/// by the node path the value was projected from.
pub trait ViewStore: Send + Sync {
    fn put(&self, projection: &str, path: &Path, view_type: ViewType, value: Value);
    fn remove(&self, projection: &str, path: &Path);
    /// Remove a single member from a `Bag` row without touching its
    /// siblings -- the operation `Extended` projections need to turn a
    /// stale value into a symmetric-difference update instead of wiping the
    /// whole row. A no-op if `value` is not present.
    fn remove_value(&self, projection: &str, path: &Path, value: &Value);
    fn get(&self, projection: &str, path: &Path) -> Option<Vec<Value>>;
    fn scan(&self, projection: &str) -> Vec<(Path, Vec<Value>)>;
}

/// Default in-memory `ViewStore`, sufficient for a single-node deployment
/// or for tests. Shared via `Arc` so multiple projection runners (and test
/// assertions) can observe the same state.
#[derive(Clone, Default)]
pub struct InMemoryViewStore {
    inner: Arc<Mutex<BTreeMap<String, BTreeMap<Path, Vec<Value>>>>>,
}

impl InMemoryViewStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewStore for InMemoryViewStore {
    fn put(&self, projection: &str, path: &Path, view_type: ViewType, value: Value) {
        let mut guard = self.inner.lock().unwrap();
        let view = guard.entry(projection.to_string()).or_default();
        match view_type {
            ViewType::Set => {
                view.insert(path.clone(), vec![value]);
            }
            ViewType::Bag => {
                view.entry(path.clone()).or_default().push(value);
            }
        }
    }

    fn remove(&self, projection: &str, path: &Path) {
        if let Some(view) = self.inner.lock().unwrap().get_mut(projection) {
            view.remove(path);
        }
    }

    fn remove_value(&self, projection: &str, path: &Path, value: &Value) {
        if let Some(view) = self.inner.lock().unwrap().get_mut(projection) {
            if let Some(values) = view.get_mut(path) {
                values.retain(|v| v != value);
                if values.is_empty() {
                    view.remove(path);
                }
            }
        }
    }

    fn get(&self, projection: &str, path: &Path) -> Option<Vec<Value>> {
        self.inner
            .lock()
            .unwrap()
            .get(projection)
            .and_then(|view| view.get(path).cloned())
    }

    fn scan(&self, projection: &str) -> Vec<(Path, Vec<Value>)> {
        self.inner
            .lock()
            .unwrap()
            .get(projection)
            .map(|view| view.iter().map(|(p, v)| (p.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

//! Test data builders: fluently construct a batch of writes, a keep-while
//! watch map, or a trigger/projection spec, instead of hand-assembling
//! `CommandOptions`/`BTreeMap` literals in every test.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::dispatch::{EventAction, ProjectionKind, ProjectionOptions, ProjectionSpec, TriggerId, TriggerSpec};
use crate::path::{self, Condition, Path};

/// Accumulates `(pattern, value)` pairs to seed a tree with one call per
/// path via [`crate::testing::assertions::seed`]-style application.
#[derive(Debug, Clone, Default)]
pub struct TreeDataBuilder {
    entries: Vec<(String, Value)>,
}

impl TreeDataBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, pattern: impl Into<String>, value: Value) -> Self {
        self.entries.push((pattern.into(), value));
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// Fluently builds a `keep_while` watch map for `CommandOptions`.
#[derive(Debug, Clone, Default)]
pub struct KeepWhileBuilder {
    watches: BTreeMap<Path, Condition>,
}

impl KeepWhileBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics if `watched` is not a valid literal path.
    #[must_use]
    pub fn watch(mut self, watched: &str, condition: Condition) -> Self {
        let path = path::parse_path(watched).unwrap_or_else(|e| panic!("invalid watched path {watched:?}: {e}"));
        self.watches.insert(path, condition);
        self
    }

    #[must_use]
    pub fn build(self) -> BTreeMap<Path, Condition> {
        self.watches
    }
}

/// Fluently builds a [`TriggerSpec`] for tests that register triggers.
#[derive(Debug, Clone)]
pub struct TriggerSpecBuilder {
    id: String,
    pattern: String,
    actions: Vec<EventAction>,
    priority: i32,
    sproc_path: String,
}

impl TriggerSpecBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, sproc_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            actions: Vec::new(),
            priority: 0,
            sproc_path: sproc_path.into(),
        }
    }

    #[must_use]
    pub fn on(mut self, action: EventAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// # Panics
    /// Panics if `pattern` or `sproc_path` do not parse.
    #[must_use]
    pub fn build(self) -> TriggerSpec {
        TriggerSpec {
            id: TriggerId::new(self.id),
            pattern: path::parse_string(&self.pattern).unwrap_or_else(|e| panic!("invalid trigger pattern: {e}")),
            actions: self.actions.into_iter().collect(),
            priority: self.priority,
            sproc_path: path::parse_path(&self.sproc_path).unwrap_or_else(|e| panic!("invalid sproc path: {e}")),
        }
    }
}

/// Fluently builds a [`ProjectionSpec`] for tests that register
/// projections.
#[derive(Debug, Clone)]
pub struct ProjectionSpecBuilder {
    name: String,
    pattern: String,
    kind: ProjectionKind,
    function_name: String,
    options: ProjectionOptions,
}

impl ProjectionSpecBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            kind: ProjectionKind::Simple,
            function_name: function_name.into(),
            options: ProjectionOptions::default(),
        }
    }

    #[must_use]
    pub fn extended(mut self) -> Self {
        self.kind = ProjectionKind::Extended;
        self
    }

    #[must_use]
    pub fn options(mut self, options: ProjectionOptions) -> Self {
        self.options = options;
        self
    }

    /// # Panics
    /// Panics if `pattern` does not parse.
    #[must_use]
    pub fn build(self) -> ProjectionSpec {
        ProjectionSpec {
            name: self.name,
            pattern: path::parse_string(&self.pattern).unwrap_or_else(|e| panic!("invalid projection pattern: {e}")),
            kind: self.kind,
            function_name: self.function_name,
            options: self.options,
        }
    }
}

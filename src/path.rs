//! Path & Condition Model (spec §3, §4.A).
//!
//! Pure value types with structural equality: [`Path`], [`PathPattern`],
//! [`Component`], and [`Condition`]. The walker (`crate::walker`) is the only
//! consumer that actually traverses the tree against these types; this
//! module only knows how to parse, render, combine, and test a single
//! component against a single node.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, StoreError};
use crate::tree::{Payload, TreeNode};

/// A node identifier: either an atom-like name (`:foo`) or a raw byte
/// string (the default, unprefixed, segment syntax).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeIdent {
    Atom(String),
    Bytes(Vec<u8>),
}

impl NodeIdent {
    #[must_use]
    pub fn atom<S: Into<String>>(s: S) -> Self {
        Self::Atom(s.into())
    }

    #[must_use]
    pub fn name<S: Into<String>>(s: S) -> Self {
        Self::Bytes(s.into().into_bytes())
    }

    /// Best-effort display form, used by `render` and by `name-regex`
    /// conditions (which are defined to match against this string form).
    #[must_use]
    pub fn as_display(&self) -> String {
        match self {
            Self::Atom(s) => format!(":{s}"),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl fmt::Display for NodeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// An ordered sequence of node identifiers. The empty path denotes the root.
pub type Path = Vec<NodeIdent>;

#[must_use]
pub fn root() -> Path {
    Vec::new()
}

/// A single component of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    /// Matches exactly one sibling with this identifier.
    Literal(NodeIdent),
    /// `*` — matches any single existing sibling.
    WildcardOne,
    /// `**` — matches zero or more levels (handled specially by the walker).
    WildcardAnyDepth,
    /// A structural/data predicate on a candidate node.
    Cond(Condition),
}

/// A structural or data condition evaluated against a candidate node.
///
/// `matches` takes `existing: Option<&TreeNode>` because some conditions
/// (notably `NodeExists(false)`) must be evaluable against a path that does
/// not currently resolve to any node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Internal: pins a component to exactly one identifier. Produced by
    /// [`combine`] when wrapping an existing literal component with extra
    /// conditions; not reachable directly from `parse_string`.
    NameEquals(NodeIdent),
    NameRegex(String),
    DataMatches(Value),
    NodeExists(bool),
    HasData,
    HasSproc,
    HasPayload,
    PayloadVersionEquals(u64),
    ChildListVersionEquals(u64),
    ChildListLengthEquals(usize),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Evaluate this condition against a candidate node.
    ///
    /// # Errors
    /// `NameRegex` with an unparsable pattern returns `MismatchingNode`
    /// (the regex is treated as never matching, but the error is surfaced
    /// so the caller can tell a bad pattern from a genuine non-match).
    pub fn matches(
        &self,
        existing: Option<&TreeNode>,
        name: &NodeIdent,
    ) -> Result<bool, StoreError> {
        Ok(match self {
            Condition::NameEquals(expected) => name == expected,
            Condition::NameRegex(pattern) => {
                let re = Regex::new(pattern)
                    .map_err(|_| StoreError::new(ErrorKind::MismatchingNode))?;
                re.is_match(&name.as_display())
            }
            Condition::DataMatches(pattern) => existing.is_some_and(|n| match &n.payload {
                Payload::Data(v) => json_matches_pattern(v, pattern),
                _ => false,
            }),
            Condition::NodeExists(expect) => existing.is_some() == *expect,
            Condition::HasData => {
                existing.is_some_and(|n| matches!(n.payload, Payload::Data(_)))
            }
            Condition::HasSproc => {
                existing.is_some_and(|n| matches!(n.payload, Payload::StoredProc(_)))
            }
            Condition::HasPayload => existing.is_some_and(|n| n.payload != Payload::None),
            Condition::PayloadVersionEquals(v) => {
                existing.is_some_and(|n| n.payload_version == *v)
            }
            Condition::ChildListVersionEquals(v) => {
                existing.is_some_and(|n| n.child_list_version == *v)
            }
            Condition::ChildListLengthEquals(n_) => {
                existing.is_some_and(|n| n.children.len() == *n_)
            }
            Condition::All(conds) => {
                for c in conds {
                    if !c.matches(existing, name)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Any(conds) => {
                for c in conds {
                    if c.matches(existing, name)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(c) => !c.matches(existing, name)?,
        })
    }

    /// Specificity contribution of this condition in isolation (see
    /// [`is_specific`]).
    fn pins_single_sibling(&self) -> bool {
        match self {
            Condition::NameEquals(_) => true,
            Condition::All(conds) => conds.iter().any(Condition::pins_single_sibling),
            _ => false,
        }
    }
}

/// A very small "pattern" match for `DataMatches`: object patterns require
/// every key present in `pattern` to be present and equal in `value`
/// (subset match); any other pattern shape requires exact equality.
#[must_use]
pub fn json_matches_pattern(value: &Value, pattern: &Value) -> bool {
    match (value, pattern) {
        (Value::Object(v), Value::Object(p)) => p
            .iter()
            .all(|(k, pv)| v.get(k).is_some_and(|vv| json_matches_pattern(vv, pv))),
        _ => value == pattern,
    }
}

/// An ordered sequence of [`Component`]s.
pub type PathPattern = Vec<Component>;

/// A component is **specific** iff it is a literal identifier, or a
/// condition that cannot match more than one sibling at a given depth
/// (spec §4.A). Mutations requiring a single target must see every
/// component satisfy this.
#[must_use]
pub fn is_specific(pattern: &[Component]) -> bool {
    pattern.iter().all(|c| match c {
        Component::Literal(_) => true,
        Component::Cond(cond) => cond.pins_single_sibling(),
        Component::WildcardOne | Component::WildcardAnyDepth => false,
    })
}

/// Require `pattern` to be specific, or fail with `NotSpecific` before any
/// tree lookup occurs (spec §4.A).
pub fn require_specific(pattern: &[Component]) -> Result<(), StoreError> {
    if is_specific(pattern) {
        Ok(())
    } else {
        Err(StoreError::new(ErrorKind::NotSpecific))
    }
}

/// Append `extra` conditions to the final component of `pattern`, wrapping
/// an existing literal as a `NameEquals` condition so specificity is
/// preserved. Used by `create`/`update`/`compare_and_swap` to inject their
/// structural preconditions (spec §4.E).
#[must_use]
pub fn combine(pattern: &[Component], extra: Vec<Condition>) -> PathPattern {
    let mut out = pattern.to_vec();
    let Some(last) = out.pop() else {
        return extra.into_iter().map(Component::Cond).collect();
    };
    let base_cond = match last {
        Component::Literal(id) => Condition::NameEquals(id),
        Component::Cond(c) => c,
        other @ (Component::WildcardOne | Component::WildcardAnyDepth) => {
            out.push(other);
            out.extend(extra.into_iter().map(Component::Cond));
            return out;
        }
    };
    let mut all = vec![base_cond];
    all.extend(extra);
    out.push(Component::Cond(Condition::All(all)));
    out
}

/// Parse the Unix-like grammar: `/`-separated components, a leading `:`
/// marks an atomic identifier, `*` is wildcard-one, `**` is
/// wildcard-any-depth. A leading `/` (or the empty string) denotes the root.
pub fn parse_string(s: &str) -> Result<PathPattern, StoreError> {
    let trimmed = s.strip_prefix('/').unwrap_or(s);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|token| {
            if token.is_empty() {
                Err(StoreError::new(ErrorKind::MismatchingNode))
            } else if token == "**" {
                Ok(Component::WildcardAnyDepth)
            } else if token == "*" {
                Ok(Component::WildcardOne)
            } else if let Some(rest) = token.strip_prefix(':') {
                Ok(Component::Literal(NodeIdent::Atom(rest.to_string())))
            } else {
                Ok(Component::Literal(NodeIdent::Bytes(token.as_bytes().to_vec())))
            }
        })
        .collect()
}

/// Parse a concrete (wildcard/condition-free) path, e.g. for use as a
/// keep-while watched/watcher path.
///
/// # Errors
/// Returns `MismatchingNode` if any component parses as a wildcard or
/// condition rather than a literal identifier.
pub fn parse_path(s: &str) -> Result<Path, StoreError> {
    parse_string(s)?
        .into_iter()
        .map(|c| match c {
            Component::Literal(id) => Ok(id),
            _ => Err(StoreError::new(ErrorKind::MismatchingNode)),
        })
        .collect()
}

/// Render a pattern back to its string form. Round-trips with
/// `parse_string` for the literal/wildcard grammar (spec §8, property 6);
/// conditions injected via [`combine`] render using a debug form since they
/// have no surface syntax of their own.
#[must_use]
pub fn render(pattern: &[Component]) -> String {
    if pattern.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for c in pattern {
        out.push('/');
        match c {
            Component::Literal(id) => out.push_str(&render_ident(id)),
            Component::WildcardOne => out.push('*'),
            Component::WildcardAnyDepth => out.push_str("**"),
            Component::Cond(cond) => out.push_str(&render_condition(cond)),
        }
    }
    out
}

fn render_ident(id: &NodeIdent) -> String {
    match id {
        NodeIdent::Atom(s) => format!(":{s}"),
        NodeIdent::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

fn render_condition(cond: &Condition) -> String {
    match cond {
        Condition::NameEquals(id) => render_ident(id),
        other => format!("{other:?}"),
    }
}

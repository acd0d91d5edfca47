//! The stable error taxonomy carried on the wire (spec §7).
//!
//! Every fallible operation in this crate eventually resolves to a
//! [`StoreError`]: an [`ErrorKind`] paired with an [`Info`] map whose keys are
//! stable across versions, so callers (and other replicas comparing replies)
//! can match on them without parsing human prose.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable, structured context attached to an [`ErrorKind`].
///
/// A `BTreeMap` rather than a `HashMap` so that serialized `Info` values
/// compare equal byte-for-byte across replicas (snapshot/log comparisons,
/// deterministic tests) regardless of insertion order.
pub type Info = BTreeMap<&'static str, Value>;

/// Build an [`Info`] map from `(key, value)` pairs.
#[macro_export]
macro_rules! info {
    ($($k:expr => $v:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut m = $crate::error::Info::new();
        $(m.insert($k, serde_json::json!($v));)*
        m
    }};
}

/// The closed set of error kinds named in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum ErrorKind {
    /// A resolved path does not exist in the tree.
    #[error("node not found")]
    NodeNotFound,
    /// A structural condition failed on a node that otherwise exists.
    #[error("mismatching node")]
    MismatchingNode,
    /// A pattern used for a single-target mutation can match more than one
    /// sibling at some depth.
    #[error("pattern is not specific")]
    NotSpecific,
    /// An update was denied (e.g. the root node's payload may never change).
    #[error("update denied")]
    DeniedUpdate,
    /// A read-only transaction attempted to call a mutating primitive.
    #[error("store update denied inside a read-only transaction")]
    StoreUpdateDenied,
    /// `Auto` transaction classification could not be resolved and the
    /// caller asked for the strict (non-conservative) refusal behavior.
    #[error("transaction function could not be analyzed")]
    UnanalyzableTxFun,
    /// A transaction, projection, or trigger function did not match its
    /// inputs (the "no function clause matching" case of scenario S7).
    #[error("function clause mismatch")]
    FunctionClause,
    /// Duplicate registration of a trigger id or projection name.
    #[error("already exists")]
    Exists,
    /// A synchronous call's timeout elapsed before a reply arrived.
    #[error("timed out")]
    Timeout,
    /// An option map contained a key/value combination the command does not
    /// recognize (scenario S6).
    #[error("unexpected option")]
    UnexpectedOption,
    /// The contacted replica is not (or is no longer) the leader.
    #[error("not leader")]
    NotLeader,
    /// No quorum is currently available to commit or read-after-quorum.
    #[error("no quorum")]
    NoQuorum,
}

/// The error type returned at the public API boundary.
///
/// Internal plumbing is free to compose with `anyhow::Result`; this is the
/// type every command validation path and every [`crate::store::Store`]
/// method ultimately converges on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreError {
    pub kind: ErrorKind,
    pub info: Info,
}

impl StoreError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            info: Info::new(),
        }
    }

    #[must_use]
    pub fn with_info(kind: ErrorKind, info: Info) -> Self {
        Self { kind, info }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.info.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} ({:?})", self.kind, self.info)
        }
    }
}

impl std::error::Error for StoreError {}

impl From<ErrorKind> for StoreError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

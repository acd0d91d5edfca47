//! Per-command options (spec §4.E, §9).
//!
//! [`CommandOptions`] is attached to every mutating and read command. None
//! of its fields are required for correctness of the deterministic core --
//! they tune what gets returned, how strict matching is, and (for `favor`
//! and `timeout`) how the surrounding `Log`/transport layer should behave.
//! The state machine itself only consults `keep_while`, `props_to_return`,
//! and `expect_specific_node`; `favor`, `timeout`, and `async_command` are
//! read by `crate::store::Store` before/after the command is ever handed to
//! the log.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::path::{Condition, Path};

/// A single node property a caller can ask to have echoed back on a
/// [`crate::state_machine::Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropName {
    Payload,
    PayloadVersion,
    ChildListVersion,
    ChildNames,
}

/// Read/consistency-latency tradeoff hint passed down to the `Log` (spec
/// §6). The deterministic core ignores this field entirely; it governs how
/// the surrounding replication layer services the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Favor {
    /// Always read the leader's most recent committed state.
    #[default]
    ConsistentRead,
    /// Allow a local (possibly stale) read if it avoids a round trip.
    CompromiseOnFreshness,
    /// Prefer latency over freshness even more aggressively; may read from
    /// a follower that is still catching up.
    LowLatency,
}

/// Correlates an async command with the reply the caller later redeems via
/// `crate::store::Store::wait_for` (spec §9, "async correlation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

/// Options accompanying a single command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOptions {
    /// How long the caller is willing to wait for a reply. `None` means
    /// wait indefinitely (bounded only by the `Log`'s own behavior).
    pub timeout: Option<Duration>,
    /// If true, the command returns as soon as it is submitted to the log,
    /// without waiting for the reply.
    pub async_command: bool,
    pub favor: Favor,
    /// Conditions this command's target(s) should be kept alive under,
    /// installed into the keep-while graph as part of the same state
    /// transition (spec §4.D). `None` leaves any existing watches on the
    /// target untouched; `Some(empty map)` clears them.
    pub keep_while: Option<BTreeMap<Path, Condition>>,
    /// Which node properties to include in the reply. Empty means "payload
    /// only", matching the common case.
    pub props_to_return: BTreeSet<PropName>,
    /// Require the pattern to resolve to exactly one node at apply time,
    /// even if it would otherwise be tolerated as a multi-match read.
    pub expect_specific_node: bool,
    /// Include the root node's own properties in a multi-node reply when
    /// the pattern matches it (e.g. `/**`). Default excludes it.
    pub include_root_props: bool,
}

impl CommandOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_favor(mut self, favor: Favor) -> Self {
        self.favor = favor;
        self
    }

    #[must_use]
    pub fn with_keep_while(mut self, keep_while: BTreeMap<Path, Condition>) -> Self {
        self.keep_while = Some(keep_while);
        self
    }

    #[must_use]
    pub fn returning(mut self, props: impl IntoIterator<Item = PropName>) -> Self {
        self.props_to_return.extend(props);
        self
    }

    #[must_use]
    pub fn expecting_specific_node(mut self) -> Self {
        self.expect_specific_node = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let opts = CommandOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_favor(Favor::LowLatency)
            .returning([PropName::Payload, PropName::PayloadVersion])
            .expecting_specific_node();

        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.favor, Favor::LowLatency);
        assert!(opts.props_to_return.contains(&PropName::Payload));
        assert!(opts.expect_specific_node);
    }
}

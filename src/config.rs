//! Store-wide configuration: a plain, `Default`-able struct the embedding
//! application builds once at startup.

use std::time::Duration;

use crate::options::Favor;

/// How often (and whether) the store takes full-state snapshots, feature
/// `snapshotting` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Disabled,
    EveryNCommands(u64),
}

/// Top-level store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default `Favor` applied to commands that do not specify one
    /// explicitly.
    pub default_favor: Favor,
    /// Default command timeout.
    pub default_timeout: Option<Duration>,
    #[cfg(feature = "snapshotting")]
    pub snapshot_policy: SnapshotPolicy,
    /// Whether this replica fires triggers (should be true on the leader
    /// only; see `crate::triggers::fire_triggers`).
    pub fires_triggers: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_favor: Favor::ConsistentRead,
            default_timeout: Some(Duration::from_secs(30)),
            #[cfg(feature = "snapshotting")]
            snapshot_policy: SnapshotPolicy::Disabled,
            fires_triggers: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_favors_consistency() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.default_favor, Favor::ConsistentRead);
        assert!(cfg.fires_triggers);
    }
}

//! The `Log` contract (spec §6): the external, replicated append-only log
//! this crate's deterministic core is designed to sit on top of.
//!
//! Nothing in `crate::state_machine` knows how commands get from a caller
//! to every replica, or how a leader is chosen -- that is `Log`'s job.
//! [`local_log`] is the one reference implementation this crate ships: a
//! single-node, in-process log that commits synchronously. It exists so the
//! crate is usable (and testable) standalone; a real deployment replaces it
//! with a Raft/Paxos-backed implementation wired to `State::apply` the same
//! way.

use crate::error::StoreResult;
use crate::state_machine::{Command, Reply, SideEffect};

/// What a command needs appended to the log and replayed identically on
/// every replica before a reply is possible.
pub trait Log: Send + Sync {
    /// Submit `command` for replication and application. Blocks until the
    /// command has committed (unless the caller's `CommandOptions` asked
    /// for an async reply, which is a concern of `crate::store::Store`, not
    /// of `Log` itself).
    ///
    /// # Errors
    /// Propagates `NotLeader`/`NoQuorum`/`Timeout` (spec §7) for
    /// replication-layer failures, or any `StoreError` the state machine
    /// itself raised while applying the command.
    fn submit(&self, command: Command) -> StoreResult<(Reply, Vec<SideEffect>)>;

    /// True if this replica is currently the leader (triggers only fire on
    /// the leader, spec §4.G).
    fn is_leader(&self) -> bool;

    /// Take a full-state snapshot at the current log index, for use by
    /// `crate::snapshot` (feature `snapshotting`).
    #[cfg(feature = "snapshotting")]
    fn snapshot(&self) -> StoreResult<crate::snapshot::Snapshot>;
}

pub mod local_log {
    //! Single-node reference [`Log`](super::Log): a `Mutex<State>` applied
    //! to directly, with no replication and no followers. Always the
    //! leader. A shared, mutex-guarded inner value behind a cheaply
    //! `Clone`-able handle.

    use std::sync::{Arc, Mutex};

    use super::Log;
    use crate::error::StoreResult;
    use crate::state_machine::{Command, Reply, SideEffect, State};
    use crate::transaction::TxRegistry;

    /// A single-node log. `Clone`-able; clones share the same underlying
    /// state and monotonic index counter.
    #[derive(Clone)]
    pub struct LocalLog {
        inner: Arc<Mutex<Inner>>,
        tx_registry: Arc<TxRegistry>,
        #[cfg(feature = "snapshotting")]
        snapshot_policy: crate::config::SnapshotPolicy,
    }

    struct Inner {
        state: State,
        index: u64,
        #[cfg(feature = "snapshotting")]
        latest_auto_snapshot: Option<crate::snapshot::Snapshot>,
    }

    impl LocalLog {
        #[must_use]
        pub fn new(tx_registry: TxRegistry) -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    state: State::new(),
                    index: 0,
                    #[cfg(feature = "snapshotting")]
                    latest_auto_snapshot: None,
                })),
                tx_registry: Arc::new(tx_registry),
                #[cfg(feature = "snapshotting")]
                snapshot_policy: crate::config::SnapshotPolicy::Disabled,
            }
        }

        /// Like [`Self::new`], but with an automatic-snapshot policy that
        /// `submit` consults after every successful commit.
        #[cfg(feature = "snapshotting")]
        #[must_use]
        pub fn with_snapshot_policy(
            tx_registry: TxRegistry,
            snapshot_policy: crate::config::SnapshotPolicy,
        ) -> Self {
            Self {
                snapshot_policy,
                ..Self::new(tx_registry)
            }
        }

        /// Run `f` with read-only access to the current state, without
        /// going through `submit` (used by read-heavy commands that do not
        /// need to be appended to the log at all).
        pub fn with_state<R>(&self, f: impl FnOnce(&State) -> R) -> R {
            let guard = self.inner.lock().unwrap();
            f(&guard.state)
        }

        #[must_use]
        pub fn index(&self) -> u64 {
            self.inner.lock().unwrap().index
        }

        /// The most recent snapshot taken automatically under the
        /// configured `SnapshotPolicy`, or `None` if the policy is
        /// `Disabled` or no qualifying commit has happened yet.
        #[cfg(feature = "snapshotting")]
        #[must_use]
        pub fn latest_auto_snapshot(&self) -> Option<crate::snapshot::Snapshot> {
            self.inner.lock().unwrap().latest_auto_snapshot.clone()
        }

        #[cfg(feature = "snapshotting")]
        fn maybe_take_auto_snapshot(&self, guard: &mut Inner) {
            let crate::config::SnapshotPolicy::EveryNCommands(n) = self.snapshot_policy else {
                return;
            };
            if n == 0 || guard.index % n != 0 {
                return;
            }
            match crate::snapshot::Snapshot::capture(&guard.state, guard.index) {
                Ok(snap) => guard.latest_auto_snapshot = Some(snap),
                Err(err) => tracing::error!(%err, index = guard.index, "automatic snapshot capture failed"),
            }
        }
    }

    impl Default for LocalLog {
        fn default() -> Self {
            Self::new(TxRegistry::new())
        }
    }

    impl Log for LocalLog {
        fn submit(&self, command: Command) -> StoreResult<(Reply, Vec<SideEffect>)> {
            let mut guard = self.inner.lock().unwrap();
            let result = guard.state.apply(command, &self.tx_registry);
            if result.is_ok() {
                guard.index += 1;
                #[cfg(feature = "snapshotting")]
                self.maybe_take_auto_snapshot(&mut guard);
            }
            result
        }

        fn is_leader(&self) -> bool {
            true
        }

        #[cfg(feature = "snapshotting")]
        fn snapshot(&self) -> StoreResult<crate::snapshot::Snapshot> {
            let guard = self.inner.lock().unwrap();
            crate::snapshot::Snapshot::capture(&guard.state, guard.index)
                .map_err(|_| crate::error::StoreError::new(crate::error::ErrorKind::Timeout))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::options::CommandOptions;
        use crate::path::parse_string;
        use crate::tree::Payload;

        #[test]
        fn submit_applies_and_advances_index() {
            let log = LocalLog::default();
            assert_eq!(log.index(), 0);
            let (_, _effects) = log
                .submit(Command::Put {
                    pattern: parse_string("/a").unwrap(),
                    payload: Payload::Data(serde_json::json!(1)),
                    opts: CommandOptions::new(),
                })
                .unwrap();
            assert_eq!(log.index(), 1);
        }

        #[test]
        fn is_leader_is_always_true() {
            assert!(LocalLog::default().is_leader());
        }

        #[test]
        fn failed_command_does_not_advance_index() {
            let log = LocalLog::default();
            let _ = log.submit(Command::Update {
                pattern: parse_string("/missing").unwrap(),
                payload: Payload::Data(serde_json::json!(1)),
                opts: CommandOptions::new(),
            });
            assert_eq!(log.index(), 0);
        }

        #[cfg(feature = "snapshotting")]
        #[test]
        fn every_n_commands_policy_snapshots_automatically() {
            let log = LocalLog::with_snapshot_policy(
                TxRegistry::new(),
                crate::config::SnapshotPolicy::EveryNCommands(2),
            );
            assert!(log.latest_auto_snapshot().is_none());

            for i in 0..2 {
                log.submit(Command::Put {
                    pattern: parse_string(&format!("/a{i}")).unwrap(),
                    payload: Payload::Data(serde_json::json!(i)),
                    opts: CommandOptions::new(),
                })
                .unwrap();
            }

            let snap = log.latest_auto_snapshot().expect("snapshot taken on the 2nd commit");
            assert_eq!(snap.index, 2);
        }

        #[cfg(feature = "snapshotting")]
        #[test]
        fn disabled_policy_never_snapshots() {
            let log = LocalLog::new(TxRegistry::new());
            for i in 0..5 {
                log.submit(Command::Put {
                    pattern: parse_string(&format!("/a{i}")).unwrap(),
                    payload: Payload::Data(serde_json::json!(i)),
                    opts: CommandOptions::new(),
                })
                .unwrap();
            }
            assert!(log.latest_auto_snapshot().is_none());
        }
    }
}

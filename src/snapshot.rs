//! State machine snapshotting (spec §6, the `Log` contract's "snapshot and
//! restore the full state"), feature-gated behind `snapshotting`.
//!
//! `bincode::serde::{encode_to_vec, decode_from_slice}` plus a `sha2`
//! checksum over the encoded bytes, applied to a full [`State`] value
//! (see `DESIGN.md` for why `bincode`/`sha2` are declared dependencies
//! here).

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::state_machine::State;

/// A serialized, checksummed snapshot of a full [`State`].
#[derive(Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub index: u64,
    pub timestamp_ms: u64,
    pub checksum: String,
    payload: Vec<u8>,
}

impl Snapshot {
    /// Serialize `state` as of log `index`.
    ///
    /// # Errors
    /// Returns an error if `state` cannot be encoded.
    pub fn capture(state: &State, index: u64) -> Result<Self> {
        let payload = encode_to_vec(state, bincode::config::standard())
            .context("failed to serialize state machine snapshot")?;
        let checksum = compute_checksum(&payload);
        Ok(Self {
            index,
            timestamp_ms: current_timestamp_ms(),
            checksum,
            payload,
        })
    }

    /// Deserialize back into a [`State`], verifying the checksum first.
    ///
    /// # Errors
    /// Returns an error if the checksum does not match or the payload
    /// cannot be decoded.
    pub fn restore(&self) -> Result<State> {
        let computed = compute_checksum(&self.payload);
        if computed != self.checksum {
            return Err(anyhow!("snapshot integrity check failed: checksum mismatch"));
        }
        let (state, _len): (State, usize) =
            decode_from_slice(&self.payload, bincode::config::standard())
                .context("failed to deserialize state machine snapshot")?;
        Ok(state)
    }
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::cast_possible_truncation)]
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_string;
    use crate::tree::Payload;

    #[test]
    fn snapshot_round_trips_tree_contents() {
        let mut state = State::new();
        state.tree.set_payload(
            &parse_string("/stock/wood").unwrap().into_iter().map(|c| match c {
                crate::path::Component::Literal(id) => id,
                _ => unreachable!(),
            }).collect(),
            Payload::Data(serde_json::json!(12)),
        );

        let snap = Snapshot::capture(&state, 7).unwrap();
        let restored = snap.restore().unwrap();
        assert_eq!(restored.tree, state.tree);
        assert_eq!(snap.index, 7);
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let state = State::new();
        let mut snap = Snapshot::capture(&state, 1).unwrap();
        snap.payload.push(0xFF);
        assert!(snap.restore().is_err());
    }
}

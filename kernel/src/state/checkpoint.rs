// Checkpoints
//
// A checkpoint is a batch with the same record shape as a commit that
// aggregates a whole `TableState`: one protocol, one metadata, one add per
// active path and one remove per tombstone still inside the retention
// window. Seeding replay from a checkpoint must give the same state as
// replaying from version 0.

use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionKind, RemoveFile};
use crate::log::codec::{decode_batch, encode, BatchDecodeError};
use crate::log::Version;
use crate::state::TableState;

/// One week, in milliseconds.
pub const DEFAULT_TOMBSTONE_RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// How long tombstones are carried forward before loads and checkpoints
/// drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneRetention {
    pub retention_ms: i64,
}

impl Default for TombstoneRetention {
    fn default() -> Self {
        Self {
            retention_ms: DEFAULT_TOMBSTONE_RETENTION_MS,
        }
    }
}

impl TombstoneRetention {
    /// Tombstones deleted strictly before the returned timestamp are expired.
    pub fn cutoff(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.retention_ms)
    }
}

pub(crate) fn is_expired(remove: &RemoveFile, cutoff: i64) -> bool {
    remove.deletion_timestamp() < cutoff
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to decode checkpoint at version {version}: {source}")]
    Decode {
        version: Version,
        source: BatchDecodeError,
    },

    #[error("checkpoint at version {version} has no `{kind}` record")]
    MissingAction { version: Version, kind: ActionKind },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Actions making up a checkpoint of `state`.
///
/// With `expired_before` set, tombstones deleted before that timestamp are
/// left out. Files are emitted sorted by path so checkpoints are stable.
pub fn checkpoint_actions(state: &TableState, expired_before: Option<i64>) -> Vec<Action> {
    let mut adds: Vec<_> = state.active_files().values().cloned().collect();
    adds.sort_by(|a, b| a.path().cmp(b.path()));

    let mut removes: Vec<_> = state
        .tombstones()
        .values()
        .filter(|r| expired_before.map_or(true, |cutoff| !is_expired(r, cutoff)))
        .cloned()
        .collect();
    removes.sort_by(|a, b| a.path().cmp(b.path()));

    let mut actions = Vec::with_capacity(2 + adds.len() + removes.len());
    actions.push(Action::Protocol(*state.protocol()));
    actions.push(Action::Metadata(state.metadata().clone()));
    actions.extend(adds.into_iter().map(Action::Add));
    actions.extend(removes.into_iter().map(Action::Remove));
    actions
}

pub fn checkpoint_records(
    state: &TableState,
    expired_before: Option<i64>,
) -> Result<Vec<String>, CheckpointError> {
    let records = checkpoint_actions(state, expired_before)
        .iter()
        .map(encode)
        .collect::<serde_json::Result<Vec<String>>>()?;
    Ok(records)
}

/// Rebuild the state captured by a checkpoint taken at `version`.
pub fn state_from_checkpoint<S: AsRef<str>>(
    version: Version,
    records: &[S],
) -> Result<TableState, CheckpointError> {
    let actions = decode_batch(records)
        .map_err(|source| CheckpointError::Decode { version, source })?;

    for kind in [ActionKind::Protocol, ActionKind::Metadata] {
        if !actions.iter().any(|a| a.kind() == kind) {
            return Err(CheckpointError::MissingAction { version, kind });
        }
    }

    let mut state = TableState::empty(version);
    for action in actions {
        state.apply(action);
    }
    Ok(state)
}

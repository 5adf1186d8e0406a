// Snapshot Pipeline
//
// Ties the pieces together over a log store:
// store → checkpoint seed → replay → protocol gate → caller
//
// and, for writers:
// state → protocol gate → encode → store

use tracing::info;

use crate::actions::{Action, Metadata, Protocol};
use crate::config::KernelConfig;
use crate::invariants::InvariantEngine;
use crate::log::store::{LogStore, LogStoreError};
use crate::log::{RawBatch, Version, VersionBatch};
use crate::protocol::{check_read, check_write, UnsupportedProtocolError};
use crate::replay::{replay_records, replay_with_invariants, ReplayError, VersionGapError};
use crate::state::checkpoint::{checkpoint_records, state_from_checkpoint, CheckpointError};
use crate::state::TableState;

/// Errors that can occur while loading or extending a table.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("log store error: {0}")]
    Store(#[from] LogStoreError),

    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("unsupported protocol: {0}")]
    Protocol(#[from] UnsupportedProtocolError),

    #[error("failed to encode actions: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("table has no committed versions")]
    EmptyTable,

    #[error("version {requested} is not available (latest is {latest})")]
    VersionNotAvailable { requested: Version, latest: Version },
}

fn invariants_for(config: &KernelConfig) -> InvariantEngine {
    if config.strict_invariants {
        InvariantEngine::with_builtins()
    } else {
        InvariantEngine::new()
    }
}

/// Load the table state at `version` (latest when `None`).
///
/// Starts from the newest checkpoint at or below the target and replays
/// the remaining commits. Tombstones outside the retention window as of
/// `now_ms` are dropped, so the result does not depend on which
/// checkpoints exist as long as none was written with a later `now_ms`.
/// The result is only returned if this implementation is allowed to read it.
pub fn load_snapshot<S: LogStore + ?Sized>(
    store: &S,
    version: Option<Version>,
    config: &KernelConfig,
    now_ms: i64,
) -> Result<TableState, SnapshotError> {
    let latest = store.latest_version()?.ok_or(SnapshotError::EmptyTable)?;
    let target = version.unwrap_or(latest);
    if !(0..=latest).contains(&target) {
        return Err(SnapshotError::VersionNotAvailable {
            requested: target,
            latest,
        });
    }

    let checkpoint = store
        .list_checkpoints()?
        .into_iter()
        .filter(|v| *v <= target)
        .max();

    let seed = match checkpoint {
        Some(k) => state_from_checkpoint(k, &store.read_checkpoint(k)?)?,
        // explicit seed at -1 so a missing version 0 is reported as a gap
        None => TableState::empty(-1),
    };

    let batches = if seed.version() < target {
        store
            .list_versions(seed.version() + 1..=target)?
            .into_iter()
            .map(|v| store.read_batch(v).map(|records| RawBatch::new(v, records)))
            .collect::<Result<Vec<_>, LogStoreError>>()?
    } else {
        Vec::new()
    };
    let replayed = batches.len();

    let mut state = replay_records(Some(seed), batches, &invariants_for(config))?;
    if state.version() != target {
        // the store listed fewer versions than it claims to hold
        return Err(ReplayError::from(VersionGapError {
            expected: state.version().saturating_add(1),
            actual: target,
        })
        .into());
    }

    check_read(state.protocol(), config.supported_versions)?;
    state.expire_tombstones(config.tombstone_retention.cutoff(now_ms));

    info!(
        version = state.version(),
        checkpoint = ?checkpoint,
        replayed,
        files = state.num_files(),
        "loaded snapshot"
    );
    Ok(state)
}

/// Commit `actions` as the version after `state`.
///
/// Refused when this implementation may not write the table, or when the
/// actions would move the table to a protocol it could not read or write.
pub fn commit<S: LogStore + ?Sized>(
    store: &mut S,
    state: &TableState,
    actions: Vec<Action>,
    config: &KernelConfig,
) -> Result<TableState, SnapshotError> {
    check_write(state.protocol(), config.supported_versions)?;
    commit_unchecked(store, state.clone(), actions, config)
}

/// Commit version 0 of a new table.
pub fn create_table<S: LogStore + ?Sized>(
    store: &mut S,
    metadata: Metadata,
    protocol: Protocol,
    config: &KernelConfig,
) -> Result<TableState, SnapshotError> {
    commit_unchecked(
        store,
        TableState::empty(-1),
        vec![protocol.into(), metadata.into()],
        config,
    )
}

fn commit_unchecked<S: LogStore + ?Sized>(
    store: &mut S,
    state: TableState,
    actions: Vec<Action>,
    config: &KernelConfig,
) -> Result<TableState, SnapshotError> {
    for action in &actions {
        if let Action::Protocol(protocol) = action {
            check_read(protocol, config.supported_versions)?;
            check_write(protocol, config.supported_versions)?;
        }
    }

    let version = state
        .version()
        .checked_add(1)
        .ok_or(ReplayError::from(VersionGapError {
            expected: state.version(),
            actual: state.version(),
        }))?;
    let batch = VersionBatch::new(version, actions);
    let records = batch.encode()?;

    // fold first so a batch that breaks an invariant is never published
    let next = replay_with_invariants(Some(state), [batch], &invariants_for(config))?;
    store.write_batch(version, records)?;

    info!(version, files = next.num_files(), "committed version");
    Ok(next)
}

/// Write a checkpoint of `state`, dropping tombstones that fell out of the
/// retention window as of `now_ms`. Loads at or after `now_ms` expire the
/// same tombstones. Returns the number of records written.
pub fn write_checkpoint<S: LogStore + ?Sized>(
    store: &mut S,
    state: &TableState,
    config: &KernelConfig,
    now_ms: i64,
) -> Result<usize, SnapshotError> {
    let cutoff = config.tombstone_retention.cutoff(now_ms);
    let records = checkpoint_records(state, Some(cutoff))?;
    let written = records.len();
    store.write_checkpoint(state.version(), records)?;

    info!(version = state.version(), records = written, "wrote checkpoint");
    Ok(written)
}

// Deterministic Replay Engine
//
// Folds ordered version batches into a `TableState`. The fold is pure:
// the same seed and batches always produce the same state, so replays
// may run concurrently without coordination.

use tracing::debug;

use crate::invariants::{InvariantEngine, InvariantViolation};
use crate::log::codec::{decode_batch, BatchDecodeError};
use crate::log::{RawBatch, Version, VersionBatch};
use crate::state::TableState;

/// Supplied batches are not contiguous or not increasing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("version gap: expected version {expected}, got {actual}")]
pub struct VersionGapError {
    pub expected: Version,
    pub actual: Version,
}

/// Errors that can occur during replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("cannot decode version {version}: {source}")]
    Decode {
        version: Version,
        source: BatchDecodeError,
    },

    #[error(transparent)]
    VersionGap(#[from] VersionGapError),

    #[error("version {version}: {source}")]
    Invariant {
        version: Version,
        source: InvariantViolation,
    },
}

/// Replay decoded batches on top of `seed`.
///
/// Without a seed, replay starts from an empty state positioned just before
/// the first batch.
pub fn replay<I>(seed: Option<TableState>, batches: I) -> Result<TableState, ReplayError>
where
    I: IntoIterator<Item = VersionBatch>,
{
    replay_with_invariants(seed, batches, &InvariantEngine::new())
}

/// Like [`replay`], additionally evaluating `invariants` after every batch.
pub fn replay_with_invariants<I>(
    seed: Option<TableState>,
    batches: I,
    invariants: &InvariantEngine,
) -> Result<TableState, ReplayError>
where
    I: IntoIterator<Item = VersionBatch>,
{
    fold(seed, batches.into_iter().map(Ok), invariants)
}

/// Replay undecoded batches. Every record of a batch is decoded before any
/// of them is applied, so one bad record voids the whole batch.
pub fn replay_records<I>(
    seed: Option<TableState>,
    batches: I,
    invariants: &InvariantEngine,
) -> Result<TableState, ReplayError>
where
    I: IntoIterator<Item = RawBatch>,
{
    fold(seed, batches.into_iter().map(decode_raw_batch), invariants)
}

fn decode_raw_batch(raw: RawBatch) -> Result<VersionBatch, ReplayError> {
    let RawBatch { version, records } = raw;
    let actions =
        decode_batch(&records).map_err(|source| ReplayError::Decode { version, source })?;
    Ok(VersionBatch::new(version, actions))
}

fn fold<I>(
    seed: Option<TableState>,
    batches: I,
    invariants: &InvariantEngine,
) -> Result<TableState, ReplayError>
where
    I: Iterator<Item = Result<VersionBatch, ReplayError>>,
{
    let mut batches = batches.peekable();

    let mut state = match seed {
        Some(state) => state,
        None => {
            let start = match batches.peek() {
                Some(Ok(batch)) => batch.version,
                _ => 0,
            };
            // no version can precede Version::MIN
            let before = start.checked_sub(1).ok_or(VersionGapError {
                expected: 0,
                actual: start,
            })?;
            TableState::empty(before)
        }
    };

    for batch in batches {
        state = apply_batch(state, batch?, invariants)?;
    }

    Ok(state)
}

fn apply_batch(
    mut state: TableState,
    batch: VersionBatch,
    invariants: &InvariantEngine,
) -> Result<TableState, ReplayError> {
    let Some(expected) = state.version().checked_add(1) else {
        // nothing can follow Version::MAX
        return Err(VersionGapError {
            expected: state.version(),
            actual: batch.version,
        }
        .into());
    };
    if batch.version != expected {
        return Err(VersionGapError {
            expected,
            actual: batch.version,
        }
        .into());
    }

    debug!(
        version = batch.version,
        actions = batch.actions.len(),
        "applying batch"
    );

    if invariants.is_empty() {
        for action in batch.actions {
            state.apply(action);
        }
        state.set_version(batch.version);
        return Ok(state);
    }

    let previous = state.clone();
    for action in &batch.actions {
        state.apply(action.clone());
    }
    state.set_version(batch.version);

    invariants
        .evaluate(&previous, &batch, &state)
        .map_err(|source| ReplayError::Invariant {
            version: batch.version,
            source,
        })?;

    Ok(state)
}

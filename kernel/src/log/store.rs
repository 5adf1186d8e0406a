// Log Storage Abstraction
//
// Durability contract for the transaction log. Implementations may persist
// to a local directory, object storage, a database, etc. The kernel only
// needs ordered listing and whole-batch reads; atomic publication of a new
// version is the store's job.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use super::Version;

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("version conflict: expected {expected}, got {actual}")]
    VersionConflict { expected: Version, actual: Version },

    #[error("version {0} not found in log")]
    VersionNotFound(Version),

    #[error("checkpoint for version {0} not found")]
    CheckpointNotFound(Version),

    #[error("log storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage backend for the transaction log.
///
/// Properties required from implementations:
/// - Append-only
/// - Ordered
/// - Committed batches are never mutated
///
/// Implementations MUST NOT:
/// - Accept a batch for any version other than `latest + 1`
/// - Reorder records within a batch
pub trait LogStore: Send + Sync {
    /// Committed versions within `range`, ascending.
    fn list_versions(&self, range: RangeInclusive<Version>) -> Result<Vec<Version>, LogStoreError>;

    /// Raw records of one committed version, in recorded order.
    fn read_batch(&self, version: Version) -> Result<Vec<String>, LogStoreError>;

    /// Versions for which a checkpoint exists, ascending.
    fn list_checkpoints(&self) -> Result<Vec<Version>, LogStoreError>;

    /// Records of the checkpoint taken at `version`.
    fn read_checkpoint(&self, version: Version) -> Result<Vec<String>, LogStoreError>;

    /// Publish a new version.
    ///
    /// Implementations must enforce:
    /// - version == latest_version + 1 (or 0 for an empty log)
    fn write_batch(&mut self, version: Version, records: Vec<String>) -> Result<(), LogStoreError>;

    /// Store a checkpoint for an already committed version.
    fn write_checkpoint(
        &mut self,
        version: Version,
        records: Vec<String>,
    ) -> Result<(), LogStoreError>;

    /// Latest committed version, if any.
    fn latest_version(&self) -> Result<Option<Version>, LogStoreError> {
        Ok(self.list_versions(0..=Version::MAX)?.last().copied())
    }
}

/// Expected next version for a log whose newest version is `latest`.
pub fn next_version(latest: Option<Version>) -> Version {
    latest.map_or(0, |v| v + 1)
}

/// Store that keeps everything in memory. Useful for tests and for
/// callers that stage a log before persisting it elsewhere.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLogStore {
    batches: BTreeMap<Version, Vec<String>>,
    checkpoints: BTreeMap<Version, Vec<String>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn list_versions(&self, range: RangeInclusive<Version>) -> Result<Vec<Version>, LogStoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.batches.range(range).map(|(v, _)| *v).collect())
    }

    fn read_batch(&self, version: Version) -> Result<Vec<String>, LogStoreError> {
        self.batches
            .get(&version)
            .cloned()
            .ok_or(LogStoreError::VersionNotFound(version))
    }

    fn list_checkpoints(&self) -> Result<Vec<Version>, LogStoreError> {
        Ok(self.checkpoints.keys().copied().collect())
    }

    fn read_checkpoint(&self, version: Version) -> Result<Vec<String>, LogStoreError> {
        self.checkpoints
            .get(&version)
            .cloned()
            .ok_or(LogStoreError::CheckpointNotFound(version))
    }

    fn write_batch(&mut self, version: Version, records: Vec<String>) -> Result<(), LogStoreError> {
        let expected = next_version(self.batches.keys().next_back().copied());
        if version != expected {
            return Err(LogStoreError::VersionConflict {
                expected,
                actual: version,
            });
        }
        self.batches.insert(version, records);
        Ok(())
    }

    fn write_checkpoint(
        &mut self,
        version: Version,
        records: Vec<String>,
    ) -> Result<(), LogStoreError> {
        if !self.batches.contains_key(&version) {
            return Err(LogStoreError::VersionNotFound(version));
        }
        self.checkpoints.insert(version, records);
        Ok(())
    }

    fn latest_version(&self) -> Result<Option<Version>, LogStoreError> {
        Ok(self.batches.keys().next_back().copied())
    }
}

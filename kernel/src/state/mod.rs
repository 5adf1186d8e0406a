// Table State
//
// The materialized result of folding the action log up to a version.
// Only the replay engine and checkpoint reader build one; callers get
// read-only access.

use std::collections::HashMap;

use crate::actions::schema::{SchemaError, StructType};
use crate::actions::{Action, AddFile, Metadata, Protocol, RemoveFile};
use crate::log::Version;

pub mod checkpoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    version: Version,
    active_files: HashMap<String, AddFile>,
    tombstones: HashMap<String, RemoveFile>,
    metadata: Metadata,
    protocol: Protocol,
}

impl TableState {
    /// State with nothing applied, positioned just before `version + 1`.
    pub(crate) fn empty(version: Version) -> Self {
        Self {
            version,
            active_files: HashMap::new(),
            tombstones: HashMap::new(),
            metadata: Metadata::default(),
            protocol: Protocol::default(),
        }
    }

    /// Apply a single action. Later actions for the same path or the
    /// same singleton replace earlier ones in full.
    pub(crate) fn apply(&mut self, action: Action) {
        match action {
            Action::Add(add) => {
                self.tombstones.remove(add.path());
                self.active_files.insert(add.path().to_string(), add);
            }
            Action::Remove(remove) => {
                self.active_files.remove(remove.path());
                self.tombstones.insert(remove.path().to_string(), remove);
            }
            Action::Metadata(metadata) => self.metadata = metadata,
            Action::Protocol(protocol) => self.protocol = protocol,
        }
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Drop tombstones deleted before `cutoff`.
    pub(crate) fn expire_tombstones(&mut self, cutoff: i64) {
        self.tombstones
            .retain(|_, remove| !checkpoint::is_expired(remove, cutoff));
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn active_files(&self) -> &HashMap<String, AddFile> {
        &self.active_files
    }

    pub fn tombstones(&self) -> &HashMap<String, RemoveFile> {
        &self.tombstones
    }

    pub fn active_file(&self, path: &str) -> Option<&AddFile> {
        self.active_files.get(path)
    }

    pub fn tombstone(&self, path: &str) -> Option<&RemoveFile> {
        self.tombstones.get(path)
    }

    pub fn num_files(&self) -> usize {
        self.active_files.len()
    }

    /// Sum of the sizes of all active files, in bytes.
    pub fn size_in_bytes(&self) -> i64 {
        self.active_files.values().map(AddFile::size).sum()
    }

    pub fn schema(&self) -> Result<Option<StructType>, SchemaError> {
        self.metadata.parse_schema()
    }
}

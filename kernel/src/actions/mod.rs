// Action Model
//
// The four kinds of atomic facts recorded in the transaction log.
// Actions are immutable once constructed; changing the table means
// emitting new actions in a later version.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::SupportedVersions;

pub mod schema;

use schema::{SchemaError, StructType};

pub const ADD_NAME: &str = "add";
pub const REMOVE_NAME: &str = "remove";
pub const METADATA_NAME: &str = "metaData";
pub const PROTOCOL_NAME: &str = "protocol";

/// Discriminant of an [`Action`], named after its envelope field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Add,
    Remove,
    Metadata,
    Protocol,
}

impl ActionKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            ActionKind::Add => ADD_NAME,
            ActionKind::Remove => REMOVE_NAME,
            ActionKind::Metadata => METADATA_NAME,
            ActionKind::Protocol => PROTOCOL_NAME,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Malformed action content. Never repaired silently.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidActionError {
    #[error("`{kind}` action has an empty path")]
    EmptyPath { kind: ActionKind },
}

/// A single atomic change to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Protocol(Protocol),
    Metadata(Metadata),
    Add(AddFile),
    Remove(RemoveFile),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Protocol(_) => ActionKind::Protocol,
            Action::Metadata(_) => ActionKind::Metadata,
            Action::Add(_) => ActionKind::Add,
            Action::Remove(_) => ActionKind::Remove,
        }
    }

    /// Path touched by a file action.
    pub fn path(&self) -> Option<&str> {
        match self {
            Action::Add(add) => Some(add.path()),
            Action::Remove(remove) => Some(remove.path()),
            Action::Protocol(_) | Action::Metadata(_) => None,
        }
    }

    /// Re-check construction invariants on a value that bypassed the
    /// constructors, e.g. one produced by deserialization.
    pub(crate) fn validate(&self) -> Result<(), InvalidActionError> {
        match self.path() {
            Some("") => Err(InvalidActionError::EmptyPath { kind: self.kind() }),
            _ => Ok(()),
        }
    }
}

impl From<Protocol> for Action {
    fn from(protocol: Protocol) -> Self {
        Action::Protocol(protocol)
    }
}

impl From<Metadata> for Action {
    fn from(metadata: Metadata) -> Self {
        Action::Metadata(metadata)
    }
}

impl From<AddFile> for Action {
    fn from(add: AddFile) -> Self {
        Action::Add(add)
    }
}

impl From<RemoveFile> for Action {
    fn from(remove: RemoveFile) -> Self {
        Action::Remove(remove)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Minimum reader version an implementation must support to read the table
    min_reader_version: i32,
    /// Minimum writer version an implementation must support to write the table
    min_writer_version: i32,
}

impl Protocol {
    pub fn new(min_reader_version: i32, min_writer_version: i32) -> Self {
        Self {
            min_reader_version,
            min_writer_version,
        }
    }

    pub fn min_reader_version(&self) -> i32 {
        self.min_reader_version
    }

    pub fn min_writer_version(&self) -> i32 {
        self.min_writer_version
    }
}

impl From<SupportedVersions> for Protocol {
    fn from(supported: SupportedVersions) -> Self {
        Self::new(supported.reader_version, supported.writer_version)
    }
}

impl Default for Protocol {
    fn default() -> Self {
        SupportedVersions::default().into()
    }
}

fn default_provider() -> String {
    String::from("parquet")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Name of the encoding for files in this table
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Configuration options for the format
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique identifier for this table, assigned once at creation
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub format: Format,
    /// Serialized schema of the table. See [`Metadata::parse_schema`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_string: Option<String>,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
}

impl Metadata {
    /// Metadata for a brand-new table with a freshly generated id.
    pub fn new_table(
        schema_string: impl Into<String>,
        partition_columns: Vec<String>,
        created_time: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schema_string: Some(schema_string.into()),
            partition_columns,
            created_time: Some(created_time),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_configuration(mut self, configuration: HashMap<String, String>) -> Self {
        self.configuration = configuration;
        self
    }

    /// Parse `schema_string` into a structured schema.
    ///
    /// Recomputed on every call; `schema_string` stays the source of truth.
    pub fn parse_schema(&self) -> Result<Option<StructType>, SchemaError> {
        self.schema_string
            .as_deref()
            .map(StructType::parse)
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFile {
    /// Relative URI-like identifier of the data file
    path: String,
    /// Always written, even when empty
    #[serde(default)]
    partition_values: HashMap<String, String>,
    size: i64,
    /// Milliseconds since the Unix epoch
    modification_time: i64,
    data_change: bool,
    /// Opaque file statistics, passed through uninterpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<HashMap<String, String>>,
}

impl AddFile {
    pub fn try_new(
        path: impl Into<String>,
        partition_values: HashMap<String, String>,
        size: i64,
        modification_time: i64,
        data_change: bool,
    ) -> Result<Self, InvalidActionError> {
        let path = path.into();
        if path.is_empty() {
            return Err(InvalidActionError::EmptyPath {
                kind: ActionKind::Add,
            });
        }
        Ok(Self {
            path,
            partition_values,
            size,
            modification_time,
            data_change,
            stats: None,
            tags: None,
        })
    }

    pub fn with_stats(mut self, stats: impl Into<String>) -> Self {
        self.stats = Some(stats.into());
        self
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn partition_values(&self) -> &HashMap<String, String> {
        &self.partition_values
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn modification_time(&self) -> i64 {
        self.modification_time
    }

    pub fn data_change(&self) -> bool {
        self.data_change
    }

    pub fn stats(&self) -> Option<&str> {
        self.stats.as_deref()
    }

    pub fn tags(&self) -> Option<&HashMap<String, String>> {
        self.tags.as_ref()
    }
}

fn default_data_change() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFile {
    path: String,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deletion_timestamp: Option<i64>,
    #[serde(default = "default_data_change")]
    data_change: bool,
}

impl RemoveFile {
    pub fn try_new(
        path: impl Into<String>,
        deletion_timestamp: Option<i64>,
        data_change: bool,
    ) -> Result<Self, InvalidActionError> {
        let path = path.into();
        if path.is_empty() {
            return Err(InvalidActionError::EmptyPath {
                kind: ActionKind::Remove,
            });
        }
        Ok(Self {
            path,
            deletion_timestamp,
            data_change,
        })
    }

    /// Tombstone for a previously added file, deleted at `timestamp`.
    pub fn from_add(add: &AddFile, timestamp: i64, data_change: bool) -> Self {
        Self {
            path: add.path.clone(),
            deletion_timestamp: Some(timestamp),
            data_change,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Deletion time in epoch milliseconds, `0` when it was never recorded.
    pub fn deletion_timestamp(&self) -> i64 {
        self.deletion_timestamp.unwrap_or(0)
    }

    pub fn raw_deletion_timestamp(&self) -> Option<i64> {
        self.deletion_timestamp
    }

    pub fn data_change(&self) -> bool {
        self.data_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_requires_path() {
        let err = AddFile::try_new("", HashMap::new(), 10, 0, true).unwrap_err();
        assert_eq!(
            err,
            InvalidActionError::EmptyPath {
                kind: ActionKind::Add
            }
        );
    }

    #[test]
    fn remove_file_requires_path() {
        let err = RemoveFile::try_new("", Some(1), true).unwrap_err();
        assert!(err.to_string().contains("remove"));
    }

    #[test]
    fn remove_from_add_copies_path_and_uses_given_timestamp() {
        let add = AddFile::try_new("part-0.parquet", HashMap::new(), 10, 5, true)
            .unwrap()
            .with_stats(r#"{"numRecords":3}"#);

        let remove = RemoveFile::from_add(&add, 1_000, false);

        assert_eq!(remove.path(), "part-0.parquet");
        assert_eq!(remove.deletion_timestamp(), 1_000);
        assert!(!remove.data_change());
    }

    #[test]
    fn missing_deletion_timestamp_reads_as_zero() {
        let remove = RemoveFile::try_new("a", None, true).unwrap();
        assert_eq!(remove.deletion_timestamp(), 0);
        assert_eq!(remove.raw_deletion_timestamp(), None);
    }

    #[test]
    fn new_table_metadata_gets_unique_ids() {
        let a = Metadata::new_table("{}", vec![], 1);
        let b = Metadata::new_table("{}", vec![], 1);

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert_eq!(a.format.provider, "parquet");
    }

    #[test]
    fn default_protocol_matches_supported_versions() {
        let supported = SupportedVersions::default();
        let protocol = Protocol::default();

        assert_eq!(protocol.min_reader_version(), supported.reader_version);
        assert_eq!(protocol.min_writer_version(), supported.writer_version);
    }

    #[test]
    fn validate_catches_empty_path_from_deserialized_values() {
        let add: AddFile = serde_json::from_str(
            r#"{"path":"","partitionValues":{},"size":1,"modificationTime":1,"dataChange":true}"#,
        )
        .unwrap();

        assert!(Action::Add(add).validate().is_err());
    }
}

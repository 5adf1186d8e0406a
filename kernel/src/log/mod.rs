use crate::actions::Action;

pub mod codec;
pub mod store;

pub use codec::{decode, decode_batch, encode, DecodeError, Envelope, MalformedRecordError};
pub use store::{InMemoryLogStore, LogStore, LogStoreError};

/// Logical version of a table.
///
/// Signed so that the state before version 0 can be represented as `-1`.
pub type Version = i64;

/// Ordered actions committed together at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBatch {
    pub version: Version,
    pub actions: Vec<Action>,
}

impl VersionBatch {
    pub fn new(version: Version, actions: Vec<Action>) -> Self {
        Self { version, actions }
    }

    /// Encode every action as one newline-free record.
    pub fn encode(&self) -> serde_json::Result<Vec<String>> {
        self.actions.iter().map(encode).collect()
    }
}

/// Undecoded records of one version, as supplied by a [`LogStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    pub version: Version,
    pub records: Vec<String>,
}

impl RawBatch {
    pub fn new(version: Version, records: Vec<String>) -> Self {
        Self { version, records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Metadata, Protocol};

    #[test]
    fn batch_encodes_one_record_per_action() {
        let batch = VersionBatch::new(
            0,
            vec![
                Protocol::new(1, 2).into(),
                Metadata::new_table("{}", vec![], 0).into(),
            ],
        );

        let records = batch.encode().unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.contains('\n')));
        assert!(records[0].starts_with(r#"{"protocol""#));
    }
}

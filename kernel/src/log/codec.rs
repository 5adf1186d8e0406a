// Action envelope codec
//
// Every log record is a JSON object with at most one of the fields
// `add`, `remove`, `metaData`, `protocol` populated. Unknown fields are
// ignored so that records written by newer protocol versions still decode.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::actions::{
    Action, ActionKind, AddFile, InvalidActionError, Metadata, Protocol, RemoveFile,
};

/// Order in which envelope fields are inspected when decoding. The first
/// populated field wins, which makes envelopes carrying several actions
/// decode deterministically.
pub const DECODE_PRECEDENCE: [ActionKind; 4] = [
    ActionKind::Add,
    ActionKind::Remove,
    ActionKind::Metadata,
    ActionKind::Protocol,
];

/// Record could not be parsed as an envelope at all.
#[derive(Debug, thiserror::Error)]
#[error("malformed log record: {source}")]
pub struct MalformedRecordError {
    #[from]
    source: serde_json::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),

    #[error("invalid action: {0}")]
    InvalidAction(#[from] InvalidActionError),
}

/// Failure to decode one record of a batch.
#[derive(Debug, thiserror::Error)]
#[error("record {index}: {source}")]
pub struct BatchDecodeError {
    pub index: usize,
    pub source: DecodeError,
}

/// Wire form of a single action.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<AddFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<RemoveFile>,
    #[serde(
        rename = "metaData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub meta_data: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl Envelope {
    /// Kinds whose field is populated, in [`DECODE_PRECEDENCE`] order.
    pub fn populated_kinds(&self) -> Vec<ActionKind> {
        DECODE_PRECEDENCE
            .into_iter()
            .filter(|kind| match kind {
                ActionKind::Add => self.add.is_some(),
                ActionKind::Remove => self.remove.is_some(),
                ActionKind::Metadata => self.meta_data.is_some(),
                ActionKind::Protocol => self.protocol.is_some(),
            })
            .collect()
    }
}

impl From<Action> for Envelope {
    fn from(action: Action) -> Self {
        match action {
            Action::Add(add) => Envelope {
                add: Some(add),
                ..Default::default()
            },
            Action::Remove(remove) => Envelope {
                remove: Some(remove),
                ..Default::default()
            },
            Action::Metadata(metadata) => Envelope {
                meta_data: Some(metadata),
                ..Default::default()
            },
            Action::Protocol(protocol) => Envelope {
                protocol: Some(protocol),
                ..Default::default()
            },
        }
    }
}

/// Borrowing twin of [`Envelope`] used for encoding.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    add: Option<&'a AddFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remove: Option<&'a RemoveFile>,
    #[serde(rename = "metaData", skip_serializing_if = "Option::is_none")]
    meta_data: Option<&'a Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<&'a Protocol>,
}

impl<'a> From<&'a Action> for EnvelopeRef<'a> {
    fn from(action: &'a Action) -> Self {
        let mut envelope = EnvelopeRef {
            add: None,
            remove: None,
            meta_data: None,
            protocol: None,
        };
        match action {
            Action::Add(add) => envelope.add = Some(add),
            Action::Remove(remove) => envelope.remove = Some(remove),
            Action::Metadata(metadata) => envelope.meta_data = Some(metadata),
            Action::Protocol(protocol) => envelope.protocol = Some(protocol),
        }
        envelope
    }
}

/// Pick the action carried by an envelope using [`DECODE_PRECEDENCE`].
///
/// Returns `None` for an envelope with no known field populated.
pub fn resolve_envelope(envelope: Envelope) -> Option<Action> {
    let populated = envelope.populated_kinds();
    if populated.len() > 1 {
        warn!(
            populated = ?populated,
            chosen = %populated[0],
            "log record populates more than one action field"
        );
    }

    let Envelope {
        add,
        remove,
        meta_data,
        protocol,
    } = envelope;

    add.map(Action::Add)
        .or_else(|| remove.map(Action::Remove))
        .or_else(|| meta_data.map(Action::Metadata))
        .or_else(|| protocol.map(Action::Protocol))
}

pub fn encode(action: &Action) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef::from(action))
}

/// Decode a single record. `Ok(None)` means the record carries no action
/// this implementation understands and should be treated as a no-op.
pub fn decode(record: &str) -> Result<Option<Action>, DecodeError> {
    let envelope: Envelope = serde_json::from_str(record).map_err(MalformedRecordError::from)?;
    match resolve_envelope(envelope) {
        Some(action) => {
            action.validate()?;
            Ok(Some(action))
        }
        None => Ok(None),
    }
}

/// Decode all records of a batch, skipping blank lines and no-op records.
///
/// Fails on the first bad record; nothing from the batch is returned then.
pub fn decode_batch<I, S>(records: I) -> Result<Vec<Action>, BatchDecodeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut actions = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let record = record.as_ref();
        if record.trim().is_empty() {
            continue;
        }
        match decode(record) {
            Ok(Some(action)) => actions.push(action),
            Ok(None) => {}
            Err(source) => return Err(BatchDecodeError { index, source }),
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sample_add() -> AddFile {
        AddFile::try_new(
            "date=2024-01-01/part-0.parquet",
            HashMap::from([("date".to_string(), "2024-01-01".to_string())]),
            1024,
            1_700_000_000_000,
            true,
        )
        .unwrap()
        .with_stats(r#"{"numRecords":10,"minValues":{"id":1}}"#)
        .with_tags(HashMap::from([("origin".to_string(), "ingest".to_string())]))
    }

    fn sample_actions() -> Vec<Action> {
        vec![
            Protocol::new(1, 2).into(),
            Metadata::new_table(r#"{"type":"struct","fields":[]}"#, vec!["date".into()], 42)
                .with_name("events")
                .with_description("raw events")
                .into(),
            sample_add().into(),
            AddFile::try_new("bare.parquet", HashMap::new(), 1, 2, false)
                .unwrap()
                .into(),
            RemoveFile::from_add(&sample_add(), 1_000, true).into(),
            RemoveFile::try_new("old.parquet", None, false).unwrap().into(),
        ]
    }

    #[test]
    fn round_trips_every_action_kind() {
        for action in sample_actions() {
            let record = encode(&action).unwrap();
            assert_eq!(decode(&record).unwrap(), Some(action));
        }
    }

    #[test]
    fn encoding_populates_exactly_one_field() {
        for action in sample_actions() {
            let value: serde_json::Value = serde_json::from_str(&encode(&action).unwrap()).unwrap();
            let object = value.as_object().unwrap();
            assert_eq!(object.len(), 1);
            assert!(object.contains_key(action.kind().field_name()));
        }
    }

    #[test]
    fn empty_partition_values_are_written_and_absent_options_are_omitted() {
        let add = AddFile::try_new("a.parquet", HashMap::new(), 1, 2, true).unwrap();
        let record = encode(&add.into()).unwrap();

        assert!(record.contains(r#""partitionValues":{}"#));
        assert!(!record.contains("stats"));
        assert!(!record.contains("tags"));
        assert!(!record.contains("null"));

        let remove = RemoveFile::try_new("a.parquet", None, true).unwrap();
        assert!(!encode(&remove.into()).unwrap().contains("deletionTimestamp"));
    }

    #[test]
    fn decodes_delta_style_records() {
        let record = r#"{"add":{"path":"part-1.parquet","partitionValues":{},"size":20,"modificationTime":5,"dataChange":true,"stats":"{\"numRecords\":1}"}}"#;

        let Some(Action::Add(add)) = decode(record).unwrap() else {
            panic!("expected add");
        };
        assert_eq!(add.size(), 20);
        assert_eq!(add.stats(), Some(r#"{"numRecords":1}"#));
    }

    #[test]
    fn remove_data_change_defaults_to_true() {
        let Some(Action::Remove(remove)) = decode(r#"{"remove":{"path":"x"}}"#).unwrap() else {
            panic!("expected remove");
        };
        assert!(remove.data_change());
        assert_eq!(remove.deletion_timestamp(), 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record = r#"{"commitInfo":{"operation":"WRITE"},"protocol":{"minReaderVersion":1,"minWriterVersion":2,"readerFeatures":["x"]}}"#;
        assert_eq!(
            decode(record).unwrap(),
            Some(Action::Protocol(Protocol::new(1, 2)))
        );
    }

    #[test]
    fn envelope_without_known_fields_is_a_no_op() {
        assert_eq!(decode(r#"{"txn":{"appId":"a","version":3}}"#).unwrap(), None);
        assert_eq!(decode("{}").unwrap(), None);
        assert_eq!(decode(r#"{"add":null}"#).unwrap(), None);
    }

    #[test]
    fn precedence_is_add_remove_metadata_protocol() {
        let all = r#"{
            "protocol":{"minReaderVersion":1,"minWriterVersion":2},
            "metaData":{"id":"t"},
            "remove":{"path":"r"},
            "add":{"path":"a","partitionValues":{},"size":1,"modificationTime":1,"dataChange":true}
        }"#;
        assert_eq!(decode(all).unwrap().unwrap().kind(), ActionKind::Add);

        let no_add = r#"{"protocol":{"minReaderVersion":1,"minWriterVersion":2},"metaData":{"id":"t"},"remove":{"path":"r"}}"#;
        assert_eq!(decode(no_add).unwrap().unwrap().kind(), ActionKind::Remove);

        let meta_and_protocol =
            r#"{"protocol":{"minReaderVersion":1,"minWriterVersion":2},"metaData":{"id":"t"}}"#;
        assert_eq!(
            decode(meta_and_protocol).unwrap().unwrap().kind(),
            ActionKind::Metadata
        );
    }

    #[test]
    fn populated_kinds_follow_precedence_order() {
        let envelope = Envelope {
            protocol: Some(Protocol::new(1, 1)),
            remove: Some(RemoveFile::try_new("r", None, true).unwrap()),
            ..Default::default()
        };
        assert_eq!(
            envelope.populated_kinds(),
            vec![ActionKind::Remove, ActionKind::Protocol]
        );
    }

    #[test]
    fn malformed_record_is_rejected() {
        let err = decode(r#"{"add": {"path": "#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode("[1, 2]").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn empty_path_is_an_invalid_action() {
        let err = decode(r#"{"remove":{"path":"","deletionTimestamp":1}}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidAction(InvalidActionError::EmptyPath {
                kind: ActionKind::Remove
            })
        ));
    }

    #[test]
    fn batch_decode_skips_blank_lines_and_reports_bad_index() {
        let records = [
            r#"{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}"#,
            "",
            r#"{"commitInfo":{}}"#,
            r#"{"remove":{"path":"x"}}"#,
        ];
        assert_eq!(decode_batch(records).unwrap().len(), 2);

        let bad = [r#"{"remove":{"path":"x"}}"#, "not json"];
        let err = decode_batch(bad).unwrap_err();
        assert_eq!(err.index, 1);
    }
}

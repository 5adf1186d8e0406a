// Structured view of `Metadata::schema_string`.
//
// Field types are kept as raw JSON; interpreting them belongs to the
// schema/type layer, not the log core.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STRUCT_TYPE_NAME: &str = "struct";

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema string is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("top-level schema must be a struct, found `{0}`")]
    NotAStruct(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(rename = "type")]
    type_name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: Value,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_nullable() -> bool {
    true
}

impl StructType {
    pub fn parse(schema_string: &str) -> Result<Self, SchemaError> {
        let schema: StructType = serde_json::from_str(schema_string)?;
        if schema.type_name != STRUCT_TYPE_NAME {
            return Err(SchemaError::NotAStruct(schema.type_name));
        }
        Ok(schema)
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Metadata;

    const SCHEMA: &str = r#"{
        "type": "struct",
        "fields": [
            {"name": "id", "type": "long", "nullable": false, "metadata": {}},
            {"name": "tags", "type": {"type": "array", "elementType": "string", "containsNull": true}},
            {"name": "date", "type": "date", "nullable": true, "metadata": {"comment": "partition"}}
        ]
    }"#;

    #[test]
    fn parses_struct_schema() {
        let schema = StructType::parse(SCHEMA).unwrap();

        assert_eq!(
            schema.field_names().collect::<Vec<_>>(),
            vec!["id", "tags", "date"]
        );
        assert!(!schema.field("id").unwrap().nullable);
        // nullable defaults to true when omitted
        assert!(schema.field("tags").unwrap().nullable);
        assert_eq!(schema.field("tags").unwrap().data_type["type"], "array");
    }

    #[test]
    fn rejects_non_struct_schema() {
        let err = StructType::parse(r#"{"type":"array","fields":[]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::NotAStruct(t) if t == "array"));
    }

    #[test]
    fn metadata_schema_parse_is_repeatable() {
        let metadata = Metadata::new_table(SCHEMA, vec!["date".into()], 0);

        let first = metadata.parse_schema().unwrap();
        let second = metadata.parse_schema().unwrap();

        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn absent_schema_string_parses_to_none() {
        let metadata = Metadata::default();
        assert!(metadata.parse_schema().unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let metadata = Metadata {
            schema_string: Some("{not json".into()),
            ..Default::default()
        };
        assert!(matches!(
            metadata.parse_schema().unwrap_err(),
            SchemaError::Parse(_)
        ));
    }
}

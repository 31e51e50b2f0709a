//! Table schema definitions.
//!
//! The JSON shape consumed from callers is
//! `{name, fields: [{name, type, primary_key, indexed, nullable}]}`.
//! Validation happens once, before a table exists; a schema that passes
//! [`TableSchema::validate`] is immutable for the life of the table.

use crate::error::SchemaError;
use crate::value::DataType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Schema version for the boundary JSON artifacts.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// One column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            indexed: false,
            nullable: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Ordered set of fields plus a table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Parse the caller-facing JSON definition.
    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(raw).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// Same as [`TableSchema::from_json`] for an already-parsed document.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self, SchemaError> {
        Self::deserialize(raw).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// Structural validation: unique names, exactly one non-nullable primary key.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields);
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    field: field.name.clone(),
                });
            }
        }

        let keys: Vec<&FieldSchema> = self.fields.iter().filter(|f| f.primary_key).collect();
        match keys.as_slice() {
            [] => Err(SchemaError::MissingPrimaryKey),
            [pk] if pk.nullable => Err(SchemaError::NullablePrimaryKey {
                field: pk.name.clone(),
            }),
            [_] => Ok(()),
            many => Err(SchemaError::MultiplePrimaryKeys {
                fields: many.iter().map(|f| f.name.clone()).collect(),
            }),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn primary_key_position(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.primary_key)
    }

    /// Positions of fields carrying a secondary index (the primary key is
    /// indexed separately and excluded here).
    pub fn indexed_positions(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.indexed && !f.primary_key)
            .map(|(i, _)| i)
            .collect()
    }
}

/// JSON Schema describing the table-definition document.
pub fn table_definition_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(TableSchema);
    serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor_schema() -> TableSchema {
        TableSchema::new(
            "payments",
            vec![
                FieldSchema::new("id", DataType::Integer).primary_key(),
                FieldSchema::new("vendor", DataType::String).indexed(),
                FieldSchema::new("amount", DataType::Currency),
            ],
        )
    }

    #[test]
    fn valid_schema_passes() {
        let schema = vendor_schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.primary_key_position(), Some(0));
        assert_eq!(schema.indexed_positions(), vec![1]);
        assert_eq!(schema.position("amount"), Some(2));
    }

    #[test]
    fn duplicate_field_rejected() {
        let mut schema = vendor_schema();
        schema.fields.push(FieldSchema::new("vendor", DataType::String));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DuplicateField { field }) if field == "vendor"
        ));
    }

    #[test]
    fn primary_key_cardinality() {
        let mut schema = vendor_schema();
        schema.fields[0].primary_key = false;
        assert!(matches!(schema.validate(), Err(SchemaError::MissingPrimaryKey)));

        let mut schema = vendor_schema();
        schema.fields[1].primary_key = true;
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::MultiplePrimaryKeys { fields }) if fields.len() == 2
        ));
    }

    #[test]
    fn nullable_primary_key_rejected() {
        let mut schema = vendor_schema();
        schema.fields[0].nullable = true;
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::NullablePrimaryKey { .. })
        ));
    }

    #[test]
    fn parses_caller_json() {
        let raw = r#"{
            "name": "payments",
            "fields": [
                {"name": "id", "type": "Integer", "primary_key": true, "indexed": false},
                {"name": "vendor", "type": "String", "primary_key": false, "indexed": true},
                {"name": "amount", "type": "Currency", "primary_key": false, "indexed": false}
            ]
        }"#;
        let schema = TableSchema::from_json(raw).unwrap();
        assert_eq!(schema, vendor_schema());
    }

    #[test]
    fn parsed_documents_match_raw_text() {
        let doc = serde_json::json!({
            "name": "payments",
            "fields": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "vendor", "type": "string", "indexed": true},
                {"name": "amount", "type": "currency"}
            ]
        });
        assert_eq!(TableSchema::from_value(&doc).unwrap(), vendor_schema());
        assert_eq!(
            TableSchema::from_value(&doc).unwrap(),
            TableSchema::from_json(&doc.to_string()).unwrap()
        );
        assert!(matches!(
            TableSchema::from_value(&serde_json::json!([1, 2])),
            Err(SchemaError::Malformed(_))
        ));
    }

    #[test]
    fn json_schema_names_fields() {
        let schema = table_definition_schema();
        let text = schema.to_string();
        assert!(text.contains("primary_key"));
        assert!(text.contains("currency"));
    }

    #[test]
    fn unknown_type_is_malformed() {
        let raw = r#"{"name": "t", "fields": [{"name": "id", "type": "Decimal128"}]}"#;
        assert!(matches!(
            TableSchema::from_json(raw),
            Err(SchemaError::Malformed(_))
        ));
    }
}

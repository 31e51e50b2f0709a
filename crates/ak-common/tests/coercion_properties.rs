//! Property tests for ingestion coercion and schema validation.

use ak_common::value::{coerce, format_cents, parse_cents};
use ak_common::{DataType, FieldSchema, SchemaError, TableSchema, Value};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn currency_strings_are_exact(cents in -10_000_000_000i64..10_000_000_000i64) {
        let text = format_cents(cents);
        prop_assert_eq!(parse_cents(&text), Some(cents));
        prop_assert_eq!(coerce(&json!(text), DataType::Currency), Some(Value::Currency(cents)));
    }

    #[test]
    fn integers_coerce_from_numbers_and_strings(v in any::<i64>()) {
        prop_assert_eq!(coerce(&json!(v), DataType::Integer), Some(Value::Integer(v)));
        prop_assert_eq!(coerce(&json!(v.to_string()), DataType::Integer), Some(Value::Integer(v)));
    }

    #[test]
    fn coerced_floats_are_finite(raw in any::<f64>()) {
        match coerce(&json!(raw.to_string()), DataType::Float) {
            Some(Value::Float(f)) => prop_assert!(f.is_finite()),
            Some(other) => prop_assert!(false, "unexpected variant {:?}", other),
            None => prop_assert!(!raw.is_finite()),
        }
    }

    #[test]
    fn coerced_values_carry_declared_type(raw in prop_oneof![
        any::<i64>().prop_map(|v| json!(v)),
        any::<bool>().prop_map(|v| json!(v)),
        "[a-z0-9.$-]{0,8}".prop_map(|v| json!(v)),
    ]) {
        for data_type in [
            DataType::Integer,
            DataType::Float,
            DataType::String,
            DataType::Boolean,
            DataType::DateTime,
            DataType::Currency,
        ] {
            if let Some(value) = coerce(&raw, data_type) {
                prop_assert_eq!(value.data_type(), Some(data_type));
            }
        }
    }

    #[test]
    fn schemas_need_exactly_one_key(keys in proptest::collection::vec(any::<bool>(), 1..8)) {
        let fields = keys
            .iter()
            .enumerate()
            .map(|(i, pk)| {
                let field = FieldSchema::new(format!("f{i}"), DataType::Integer);
                if *pk { field.primary_key() } else { field }
            })
            .collect();
        let schema = TableSchema::new("t", fields);
        let count = keys.iter().filter(|k| **k).count();
        match schema.validate() {
            Ok(()) => prop_assert_eq!(count, 1),
            Err(SchemaError::MissingPrimaryKey) => prop_assert_eq!(count, 0),
            Err(SchemaError::MultiplePrimaryKeys { fields }) => prop_assert_eq!(fields.len(), count),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

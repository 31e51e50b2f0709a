//! Declared parameter schemas and fail-fast validation.
//!
//! Every detection function publishes a [`ParamSchema`]. Raw JSON parameters
//! are checked against it (and against the target table's schema for field
//! references) before any row is read; the result is a typed [`Params`] map.

use ak_common::{DataType, DetectionError, TableSchema};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Parameter value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Name of one table field.
    Field,
    /// Non-empty list of distinct table field names.
    FieldList,
    Float,
    Integer,
    /// One of a fixed set of strings.
    Choice,
}

/// One declared parameter, as published in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// `min` is exclusive rather than inclusive.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exclusive_min: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Accepted column types for field parameters (empty = any).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_types: Vec<DataType>,
    pub description: String,
}

impl ParamSpec {
    fn new(name: &str, kind: ParamKind) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
            min: None,
            max: None,
            exclusive_min: false,
            choices: Vec::new(),
            field_types: Vec::new(),
            description: String::new(),
        }
    }

    pub fn field(name: &str) -> Self {
        Self::new(name, ParamKind::Field)
    }

    pub fn field_list(name: &str) -> Self {
        Self::new(name, ParamKind::FieldList)
    }

    pub fn float(name: &str, default: f64) -> Self {
        let mut spec = Self::new(name, ParamKind::Float);
        spec.required = false;
        spec.default = Some(serde_json::json!(default));
        spec
    }

    pub fn integer(name: &str, default: i64) -> Self {
        let mut spec = Self::new(name, ParamKind::Integer);
        spec.required = false;
        spec.default = Some(serde_json::json!(default));
        spec
    }

    pub fn choice(name: &str, choices: &[&str], default: &str) -> Self {
        let mut spec = Self::new(name, ParamKind::Choice);
        spec.required = false;
        spec.choices = choices.iter().map(|c| c.to_string()).collect();
        spec.default = Some(serde_json::json!(default));
        spec
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    /// Restrict field parameters to numeric columns.
    pub fn numeric(self) -> Self {
        self.types(&[DataType::Integer, DataType::Float, DataType::Currency])
    }

    pub fn types(mut self, types: &[DataType]) -> Self {
        self.field_types = types.to_vec();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self.exclusive_min = false;
        self
    }

    pub fn min_exclusive(mut self, min: f64) -> Self {
        self.min = Some(min);
        self.exclusive_min = true;
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    fn check_range(&self, value: f64) -> Result<(), String> {
        if let Some(min) = self.min {
            let below = if self.exclusive_min {
                value <= min
            } else {
                value < min
            };
            if below {
                let op = if self.exclusive_min { ">" } else { ">=" };
                return Err(format!("{} must be {} {}, got {}", self.name, op, min, value));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(format!("{} must be <= {}, got {}", self.name, max, value));
            }
        }
        Ok(())
    }
}

/// A resolved reference to a table field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub position: usize,
    pub data_type: DataType,
}

/// Validated parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Field(FieldRef),
    Fields(Vec<FieldRef>),
    Float(f64),
    Integer(i64),
    Choice(String),
}

/// Validated parameters handed to a detection function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    fn missing(function: &str, name: &str) -> DetectionError {
        DetectionError::Internal(format!("{function}: parameter {name} was not resolved"))
    }

    pub fn field(&self, function: &str, name: &str) -> Result<&FieldRef, DetectionError> {
        match self.values.get(name) {
            Some(ParamValue::Field(f)) => Ok(f),
            _ => Err(Self::missing(function, name)),
        }
    }

    pub fn fields(&self, function: &str, name: &str) -> Result<&[FieldRef], DetectionError> {
        match self.values.get(name) {
            Some(ParamValue::Fields(f)) => Ok(f),
            _ => Err(Self::missing(function, name)),
        }
    }

    pub fn float(&self, function: &str, name: &str) -> Result<f64, DetectionError> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            _ => Err(Self::missing(function, name)),
        }
    }

    pub fn integer(&self, function: &str, name: &str) -> Result<i64, DetectionError> {
        match self.values.get(name) {
            Some(ParamValue::Integer(v)) => Ok(*v),
            _ => Err(Self::missing(function, name)),
        }
    }

    pub fn choice(&self, function: &str, name: &str) -> Result<&str, DetectionError> {
        match self.values.get(name) {
            Some(ParamValue::Choice(v)) => Ok(v),
            _ => Err(Self::missing(function, name)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered list of declared parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSchema {
    pub params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        ParamSchema { params }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check `raw` against the declared parameters and the table schema.
    ///
    /// `null` is treated as an empty object. Unknown keys are rejected.
    pub fn resolve(
        &self,
        function: &str,
        raw: &serde_json::Value,
        table: &TableSchema,
    ) -> Result<Params, DetectionError> {
        let empty = serde_json::Map::new();
        let object = match raw {
            serde_json::Value::Null => &empty,
            serde_json::Value::Object(map) => map,
            other => {
                return Err(DetectionError::invalid(
                    function,
                    format!("params must be an object, got {}", ak_common::value::json_kind(other)),
                ))
            }
        };

        if let Some(unknown) = object.keys().find(|k| self.get(k).is_none()) {
            return Err(DetectionError::invalid(
                function,
                format!("unknown parameter {unknown}"),
            ));
        }

        let mut values = BTreeMap::new();
        for spec in &self.params {
            let given = object.get(&spec.name).filter(|v| !v.is_null());
            let raw_value = match (given, &spec.default) {
                (Some(v), _) => v,
                (None, Some(default)) => default,
                (None, None) if spec.required => {
                    return Err(DetectionError::invalid(
                        function,
                        format!("missing required parameter {}", spec.name),
                    ))
                }
                (None, None) => continue,
            };
            let value = resolve_one(spec, raw_value, table)
                .map_err(|reason| DetectionError::invalid(function, reason))?;
            values.insert(spec.name.clone(), value);
        }
        Ok(Params { values })
    }
}

fn resolve_one(
    spec: &ParamSpec,
    raw: &serde_json::Value,
    table: &TableSchema,
) -> Result<ParamValue, String> {
    match spec.kind {
        ParamKind::Field => {
            let name = raw
                .as_str()
                .ok_or_else(|| format!("{} must be a field name", spec.name))?;
            resolve_field(spec, name, table).map(ParamValue::Field)
        }
        ParamKind::FieldList => {
            let items = raw
                .as_array()
                .ok_or_else(|| format!("{} must be a list of field names", spec.name))?;
            if items.is_empty() {
                return Err(format!("{} must name at least one field", spec.name));
            }
            let mut seen = HashSet::new();
            let mut fields = Vec::with_capacity(items.len());
            for item in items {
                let name = item
                    .as_str()
                    .ok_or_else(|| format!("{} must contain only field names", spec.name))?;
                if !seen.insert(name) {
                    return Err(format!("{} lists field {} twice", spec.name, name));
                }
                fields.push(resolve_field(spec, name, table)?);
            }
            Ok(ParamValue::Fields(fields))
        }
        ParamKind::Float => {
            let value = raw
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("{} must be a finite number", spec.name))?;
            spec.check_range(value)?;
            Ok(ParamValue::Float(value))
        }
        ParamKind::Integer => {
            let value = raw
                .as_i64()
                .ok_or_else(|| format!("{} must be an integer", spec.name))?;
            spec.check_range(value as f64)?;
            Ok(ParamValue::Integer(value))
        }
        ParamKind::Choice => {
            let value = raw
                .as_str()
                .filter(|v| spec.choices.iter().any(|c| c == v))
                .ok_or_else(|| {
                    format!("{} must be one of: {}", spec.name, spec.choices.join(", "))
                })?;
            Ok(ParamValue::Choice(value.to_string()))
        }
    }
}

fn resolve_field(spec: &ParamSpec, name: &str, table: &TableSchema) -> Result<FieldRef, String> {
    let position = table
        .position(name)
        .ok_or_else(|| format!("table {} has no field {}", table.name, name))?;
    let data_type = table.fields[position].data_type;
    if !spec.field_types.is_empty() && !spec.field_types.contains(&data_type) {
        let accepted: Vec<&str> = spec.field_types.iter().map(|t| t.as_str()).collect();
        return Err(format!(
            "field {} has type {}, expected one of: {}",
            name,
            data_type,
            accepted.join(", ")
        ));
    }
    Ok(FieldRef {
        name: name.to_string(),
        position,
        data_type,
    })
}

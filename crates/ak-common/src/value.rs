//! Typed cell values and coercion from JSON input.
//!
//! Every cell stored in a table is a [`Value`] whose variant matches the
//! column's [`DataType`]. Values arriving through the ingestion interface are
//! JSON and are coerced with [`coerce`]; anything that cannot be coerced is a
//! per-row rejection, never a panic.

use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "Integer", alias = "int")]
    Integer,
    #[serde(alias = "Float", alias = "double")]
    Float,
    #[serde(alias = "String", alias = "text")]
    String,
    #[serde(alias = "Boolean", alias = "bool")]
    Boolean,
    #[serde(alias = "DateTime", alias = "timestamp")]
    DateTime,
    #[serde(alias = "Currency", alias = "money")]
    Currency,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::DateTime => "datetime",
            DataType::Currency => "currency",
        }
    }

    /// Whether values of this type have a numeric view.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float | DataType::Currency)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed cell value.
///
/// Floats are always finite (coercion rejects NaN and infinities), which is
/// what makes the total `Eq`/`Hash` below sound.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// Exact amount in minor units (cents).
    Currency(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::String),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Currency(_) => Some(DataType::Currency),
        }
    }

    /// Numeric view used by statistical functions.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Currency(cents) => Some(*cents as f64 / 100.0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON rendering used in findings, reports and lookups.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(v) => serde_json::json!(v),
            Value::Float(v) => serde_json::json!(v),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Currency(cents) => serde_json::Value::String(format_cents(*cents)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Currency(a), Value::Currency(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Float(v) => float_bits(*v).hash(state),
            Value::String(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Currency(c) => c.hash(state),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::Currency(c) => f.write_str(&format_cents(*c)),
        }
    }
}

// -0.0 and 0.0 must hash and compare equal.
fn float_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Short description of a JSON value's kind, for rejection reasons.
pub fn json_kind(raw: &serde_json::Value) -> &'static str {
    match raw {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Coerce a non-null JSON value into the declared type.
///
/// Returns `None` when the value is not coercible. JSON `null` is handled by
/// the caller (it depends on field nullability).
pub fn coerce(raw: &serde_json::Value, data_type: DataType) -> Option<Value> {
    use serde_json::Value as J;
    match data_type {
        DataType::Integer => match raw {
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Integer(i))
                } else {
                    let f = n.as_f64()?;
                    integral_f64_to_i64(f).map(Value::Integer)
                }
            }
            J::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
            _ => None,
        },
        DataType::Float => {
            let f = match raw {
                J::Number(n) => n.as_f64()?,
                J::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            f.is_finite().then_some(Value::Float(f))
        }
        DataType::String => match raw {
            J::String(s) => Some(Value::String(s.clone())),
            _ => None,
        },
        DataType::Boolean => match raw {
            J::Bool(b) => Some(Value::Boolean(*b)),
            J::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        DataType::DateTime => match raw {
            J::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            J::Number(n) => {
                let secs = n.as_i64()?;
                Utc.timestamp_opt(secs, 0).single().map(Value::DateTime)
            }
            _ => None,
        },
        DataType::Currency => match raw {
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return i.checked_mul(100).map(Value::Currency);
                }
                let f = n.as_f64()?;
                f64_to_cents(f).map(Value::Currency)
            }
            J::String(s) => parse_cents(s).map(Value::Currency),
            _ => None,
        },
    }
}

fn integral_f64_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}

fn f64_to_cents(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let scaled = f * 100.0;
    let rounded = scaled.round();
    // More than two fraction digits is not a currency amount.
    if (scaled - rounded).abs() > 1e-6 {
        return None;
    }
    integral_f64_to_i64(rounded)
}

/// Parse `"-12.34"`, `"$1200"`, `"0.5"` into minor units.
pub fn parse_cents(raw: &str) -> Option<i64> {
    let mut s = raw.trim();
    let negative = s.starts_with('-');
    if negative {
        s = &s[1..];
    }
    s = s.strip_prefix('$').unwrap_or(s);
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let whole_val: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_val: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let cents = whole_val.checked_mul(100)?.checked_add(frac_val)?;
    Some(if negative { -cents } else { cents })
}

/// Render minor units as a two-decimal string.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

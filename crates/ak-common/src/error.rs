//! Error types for the audit kernel.
//!
//! Each subsystem owns a small error enum; [`Error`] unifies them for callers
//! that cross subsystem boundaries (the CLI, batch runners). Every error has:
//! - A stable numeric code for machine parsing
//! - A category for grouping
//! - A recoverability hint
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 31,
//!   "category": "detection",
//!   "message": "invalid parameters for OUTLIERS: threshold must be > 0",
//!   "recoverable": true,
//!   "context": { "function": "OUTLIERS" }
//! }
//! ```

use crate::id::TableHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or contradictory table definitions.
    Schema,
    /// Row validation and table store access.
    Ingest,
    /// Detection dispatch, parameters, and execution.
    Detection,
    /// Hex risk-field mapping.
    Mapping,
    /// Configuration files and overrides.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Schema => write!(f, "schema"),
            ErrorCategory::Ingest => write!(f, "ingest"),
            ErrorCategory::Detection => write!(f, "detection"),
            ErrorCategory::Mapping => write!(f, "mapping"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Table definition errors. Fatal: raised before any table exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("malformed schema definition: {0}")]
    Malformed(String),

    #[error("table name must not be empty")]
    EmptyName,

    #[error("table must declare at least one field")]
    NoFields,

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("duplicate field name: {field}")]
    DuplicateField { field: String },

    #[error("no field is marked primary key")]
    MissingPrimaryKey,

    #[error("more than one primary key: {}", fields.join(", "))]
    MultiplePrimaryKeys { fields: Vec<String> },

    #[error("primary key field {field} cannot be nullable")]
    NullablePrimaryKey { field: String },
}

impl SchemaError {
    pub fn code(&self) -> u32 {
        match self {
            SchemaError::Malformed(_) => 10,
            SchemaError::EmptyName => 11,
            SchemaError::NoFields => 12,
            SchemaError::EmptyFieldName => 13,
            SchemaError::DuplicateField { .. } => 14,
            SchemaError::MissingPrimaryKey => 15,
            SchemaError::MultiplePrimaryKeys { .. } => 16,
            SchemaError::NullablePrimaryKey { .. } => 17,
        }
    }
}

/// Per-row validation failure. Recorded in the ingest report, never
/// propagated out of a load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("row is not a JSON object (got {found})")]
    NotAnObject { found: String },

    #[error("missing required field {field}")]
    MissingField { field: String },

    #[error("field {field} is not declared in the schema")]
    UnknownField { field: String },

    #[error("field {field}: expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("field {field} is not nullable")]
    NullNotAllowed { field: String },

    #[error("duplicate primary key {value} in field {field}")]
    DuplicatePrimaryKey { field: String, value: String },
}

impl IngestError {
    pub fn code(&self) -> u32 {
        match self {
            IngestError::NotAnObject { .. } => 20,
            IngestError::MissingField { .. } => 21,
            IngestError::UnknownField { .. } => 22,
            IngestError::TypeMismatch { .. } => 23,
            IngestError::NullNotAllowed { .. } => 24,
            IngestError::DuplicatePrimaryKey { .. } => 25,
        }
    }
}

/// Table store access errors (handle resolution, index lookups).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table {handle} not found")]
    NotFound { handle: TableHandle },

    #[error("table {table} has no field {field}")]
    UnknownField { table: String, field: String },

    #[error("field {field} of table {table} is not indexed")]
    NotIndexed { table: String, field: String },

    #[error("table {handle} lock poisoned")]
    Poisoned { handle: TableHandle },
}

impl TableError {
    pub fn code(&self) -> u32 {
        match self {
            TableError::NotFound { .. } => 26,
            TableError::UnknownField { .. } => 27,
            TableError::NotIndexed { .. } => 28,
            TableError::Poisoned { .. } => 29,
        }
    }
}

/// Detection call failures. No partial findings accompany any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("detection function {name} not registered")]
    NotFound { name: String },

    #[error("invalid parameters for {function}: {reason}")]
    InvalidParams { function: String, reason: String },

    #[error("{function} timed out after {timeout_ms}ms")]
    Timeout { function: String, timeout_ms: u64 },

    #[error("table {handle} not found")]
    TableNotFound { handle: TableHandle },

    #[error("detection failed: {0}")]
    Internal(String),
}

impl DetectionError {
    pub fn code(&self) -> u32 {
        match self {
            DetectionError::NotFound { .. } => 30,
            DetectionError::InvalidParams { .. } => 31,
            DetectionError::Timeout { .. } => 32,
            DetectionError::TableNotFound { .. } => 33,
            DetectionError::Internal(_) => 34,
        }
    }

    pub fn invalid(function: &str, reason: impl Into<String>) -> Self {
        DetectionError::InvalidParams {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<TableError> for DetectionError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::NotFound { handle } => DetectionError::TableNotFound { handle },
            other => DetectionError::Internal(other.to_string()),
        }
    }
}

/// Reasons a finding cannot be placed on the hex field. The engine reports
/// these alongside its output rather than failing the mapping pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("no findings to map")]
    EmptyInput,

    #[error("hex radius must be positive and finite (got {radius})")]
    InvalidRadius { radius: f64 },

    #[error("finding {finding_id} has no affected rows")]
    NoAffectedRows { finding_id: String },
}

impl MappingError {
    pub fn code(&self) -> u32 {
        match self {
            MappingError::EmptyInput => 40,
            MappingError::InvalidRadius { .. } => 41,
            MappingError::NoAffectedRows { .. } => 42,
        }
    }
}

/// Unified error type for the audit kernel.
#[derive(Error, Debug)]
pub enum Error {
    // 10-19
    #[error(transparent)]
    Schema(#[from] SchemaError),

    // 20-29
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Table(#[from] TableError),

    // 30-39
    #[error(transparent)]
    Detection(#[from] DetectionError),

    // 40-49
    #[error(transparent)]
    Mapping(#[from] MappingError),

    // 50-59
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // 60-69
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Schema errors
    /// - 20-29: Ingest and table store errors
    /// - 30-39: Detection errors
    /// - 40-49: Mapping errors
    /// - 50-59: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Schema(e) => e.code(),
            Error::Ingest(e) => e.code(),
            Error::Table(e) => e.code(),
            Error::Detection(e) => e.code(),
            Error::Mapping(e) => e.code(),
            Error::Config(_) => 50,
            Error::InvalidConfig(_) => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Schema(_) => ErrorCategory::Schema,
            Error::Ingest(_) | Error::Table(_) => ErrorCategory::Ingest,
            Error::Detection(_) => ErrorCategory::Detection,
            Error::Mapping(_) => ErrorCategory::Mapping,
            Error::Config(_) | Error::InvalidConfig(_) => ErrorCategory::Config,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether a caller can reasonably retry or correct and resubmit.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fix the definition and resubmit.
            Error::Schema(_) => true,
            Error::Ingest(_) => true,
            Error::Table(TableError::Poisoned { .. }) => false,
            Error::Table(_) => true,

            Error::Detection(DetectionError::NotFound { .. }) => false,
            Error::Detection(DetectionError::Internal(_)) => false,
            Error::Detection(_) => true, // Timeout: retry with a longer budget

            Error::Mapping(_) => true,

            // Malformed configuration is fatal for the run.
            Error::Config(_) | Error::InvalidConfig(_) => false,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Schema(_) => "Invalid Table Schema",
            Error::Ingest(_) => "Row Rejected",
            Error::Table(_) => "Table Store Error",
            Error::Detection(DetectionError::Timeout { .. }) => "Detection Timeout",
            Error::Detection(_) => "Detection Failed",
            Error::Mapping(_) => "Hex Mapping Error",
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }

    /// Human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Schema(_) => {
                "Declare unique field names and exactly one non-nullable primary key."
            }
            Error::Ingest(_) => "Correct the rejected rows and load them again.",
            Error::Table(_) => "Check the table handle and that the field is declared indexed.",
            Error::Detection(DetectionError::Timeout { .. }) => {
                "Raise detection_timeout_ms or narrow the request."
            }
            Error::Detection(_) => "Run 'ak-core catalog' to list functions and their parameters.",
            Error::Mapping(_) => "Pass a positive radius and at least one finding with rows.",
            Error::Config(_) | Error::InvalidConfig(_) => {
                "Run 'ak-core check-config' to validate the configuration file."
            }
            Error::Io(_) => "Check that the input files exist and are readable.",
            Error::Json(_) => "Check the JSON syntax of the input documents.",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (function name, field, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = BTreeMap::new();

        match err {
            Error::Schema(SchemaError::DuplicateField { field })
            | Error::Schema(SchemaError::NullablePrimaryKey { field }) => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::Detection(DetectionError::NotFound { name }) => {
                context.insert("function".to_string(), serde_json::json!(name));
            }
            Error::Detection(DetectionError::InvalidParams { function, .. }) => {
                context.insert("function".to_string(), serde_json::json!(function));
            }
            Error::Detection(DetectionError::Timeout {
                function,
                timeout_ms,
            }) => {
                context.insert("function".to_string(), serde_json::json!(function));
                context.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Error::Table(TableError::NotFound { handle })
            | Error::Detection(DetectionError::TableNotFound { handle }) => {
                context.insert("table".to_string(), serde_json::json!(handle.to_string()));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

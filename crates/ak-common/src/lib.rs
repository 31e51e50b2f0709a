//! Audit kernel common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the kernel crates:
//! - Typed cell values and JSON coercion
//! - Table schemas and their validation
//! - Findings and severities
//! - Identity types (table handles, finding ids, logical ticks)
//! - The error taxonomy with stable codes
//! - Output format specifications

pub mod error;
pub mod finding;
pub mod id;
pub mod output;
pub mod schema;
pub mod value;

pub use error::{
    DetectionError, Error, ErrorCategory, IngestError, MappingError, Result, SchemaError,
    StructuredError, TableError,
};
pub use finding::{sort_findings, Finding, Severity};
pub use id::{FindingId, RowId, SessionId, TableHandle, Tick};
pub use output::OutputFormat;
pub use schema::{FieldSchema, TableSchema, SCHEMA_VERSION};
pub use value::{DataType, Value};

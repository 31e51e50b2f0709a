//! Partial-success row ingestion.
//!
//! Each incoming JSON row is validated against the schema on its own. Valid
//! rows are committed in input order; invalid ones are recorded in the
//! [`IngestReport`] with their position and reason and the batch carries on.

use ak_common::value::{coerce, json_kind};
use ak_common::{IngestError, TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::{InMemoryTable, Row};
use crate::logging::{event_names, Stage};

/// One row that did not make it into the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// Position of the row in the submitted batch.
    pub row_index: usize,
    pub reason: String,
    pub code: u32,
}

/// Outcome of a `load_rows` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedRow>,
    /// Rows processed (accepted + rejected) per second of wall time.
    pub throughput_rows_per_sec: f64,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.accepted + self.rejected.len()
    }
}

/// Validate and coerce one JSON row into schema order.
pub fn validate_row(schema: &TableSchema, raw: &serde_json::Value) -> Result<Row, IngestError> {
    let object = raw.as_object().ok_or_else(|| IngestError::NotAnObject {
        found: json_kind(raw).to_string(),
    })?;

    if let Some(unknown) = object.keys().find(|k| schema.field(k).is_none()) {
        return Err(IngestError::UnknownField {
            field: unknown.clone(),
        });
    }

    let mut row = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let value = match object.get(&field.name) {
            None if field.nullable => Value::Null,
            None => {
                return Err(IngestError::MissingField {
                    field: field.name.clone(),
                })
            }
            Some(serde_json::Value::Null) if field.nullable => Value::Null,
            Some(serde_json::Value::Null) => {
                return Err(IngestError::NullNotAllowed {
                    field: field.name.clone(),
                })
            }
            Some(raw_value) => {
                coerce(raw_value, field.data_type).ok_or_else(|| IngestError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.data_type.to_string(),
                    found: json_kind(raw_value).to_string(),
                })?
            }
        };
        row.push(value);
    }
    Ok(row)
}

/// Validate and commit a batch. Never fails as a whole.
pub fn load_rows(table: &mut InMemoryTable, rows: &[serde_json::Value]) -> IngestReport {
    let started = Instant::now();
    info!(
        event = event_names::INGEST_STARTED,
        stage = %Stage::Ingest,
        table = table.name(),
        rows = rows.len(),
        "ingest started"
    );

    let mut report = IngestReport::default();
    for (row_index, raw) in rows.iter().enumerate() {
        let outcome = validate_row(table.schema(), raw).and_then(|row| table.commit(row));
        match outcome {
            Ok(_) => report.accepted += 1,
            Err(err) => {
                debug!(
                    event = event_names::INGEST_ROW_REJECTED,
                    row_index,
                    code = err.code(),
                    reason = %err,
                    "row rejected"
                );
                report.rejected.push(RejectedRow {
                    row_index,
                    reason: err.to_string(),
                    code: err.code(),
                });
            }
        }
    }

    let secs = started.elapsed().as_secs_f64();
    report.throughput_rows_per_sec = if secs > 0.0 {
        report.processed() as f64 / secs
    } else {
        0.0
    };

    info!(
        event = event_names::INGEST_FINISHED,
        stage = %Stage::Ingest,
        table = table.name(),
        accepted = report.accepted,
        rejected = report.rejected.len(),
        elapsed_ms = (secs * 1000.0) as u64,
        "ingest finished"
    );
    report
}

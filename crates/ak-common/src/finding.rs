//! Findings produced by detection functions.

use crate::id::{FindingId, RowId, Tick};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ordered severity: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Numeric weight used by the hex field (Info=1, Warning=2, Critical=3).
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Info => 1.0,
            Severity::Warning => 2.0,
            Severity::Critical => 3.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anomaly reported by one detection call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    #[serde(rename = "function")]
    pub function_name: String,
    pub severity: Severity,
    pub affected_row_ids: BTreeSet<RowId>,
    pub metric_value: f64,
    pub description: String,
    pub detected_at: Tick,
    /// Function-specific context (key tuple, mean/stddev, digit frequencies).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Finding {
    /// Build a finding; the id is derived from its content.
    pub fn new(
        function_name: impl Into<String>,
        severity: Severity,
        affected_row_ids: BTreeSet<RowId>,
        metric_value: f64,
        description: impl Into<String>,
    ) -> Self {
        let function_name = function_name.into();
        let id = FindingId::derive(&function_name, &affected_row_ids, metric_value);
        Finding {
            id,
            function_name,
            severity,
            affected_row_ids,
            metric_value,
            description: description.into(),
            detected_at: Tick::ZERO,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn at(mut self, tick: Tick) -> Self {
        self.detected_at = tick;
        self
    }
}

/// Sort findings into a canonical order (function, id) so result sets from
/// different schedules compare equal element by element.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.function_name
            .cmp(&b.function_name)
            .then_with(|| a.id.cmp(&b.id))
    });
}

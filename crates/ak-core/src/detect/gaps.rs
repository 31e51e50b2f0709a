//! GAPS: holes in an integer sequence (e.g. invoice or cheque numbers).

use ak_common::{DataType, DetectionError, Finding, RowId, Severity, Value};
use std::collections::BTreeMap;

use super::{DetectionContext, DetectionFunction, ParamSchema, ParamSpec, Params};

pub const NAME: &str = "GAPS";

/// Holes with more missing values than this are Critical.
pub const CRITICAL_MISSING: i128 = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct Gaps;

impl DetectionFunction for Gaps {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Missing runs in the sorted distinct values of an integer field"
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::field("field")
                .types(&[DataType::Integer])
                .describe("Integer sequence field"),
            ParamSpec::integer("min_gap", 1)
                .min(1.0)
                .describe("Report holes of at least this many missing values"),
        ])
    }

    fn run(
        &self,
        ctx: &DetectionContext<'_>,
        params: &Params,
    ) -> Result<Vec<Finding>, DetectionError> {
        let field = params.field(NAME, "field")?;
        let min_gap = i128::from(params.integer(NAME, "min_gap")?);

        // Lowest row id per distinct value.
        let partials = ctx.map_shards(|range| {
            let mut first_seen: BTreeMap<i64, RowId> = BTreeMap::new();
            for (row, value) in ctx.table.column_range(field.position, range) {
                if let Value::Integer(v) = value {
                    first_seen.entry(*v).or_insert(row);
                }
            }
            first_seen
        })?;
        let mut distinct: BTreeMap<i64, RowId> = BTreeMap::new();
        for part in partials {
            for (value, row) in part {
                distinct.entry(value).or_insert(row);
            }
        }

        let sorted: Vec<(i64, RowId)> = distinct.into_iter().collect();
        let mut findings = Vec::new();
        for pair in sorted.windows(2) {
            let [(low, low_row), (high, high_row)] = pair else {
                continue;
            };
            let missing = i128::from(*high) - i128::from(*low) - 1;
            if missing < min_gap {
                continue;
            }
            let severity = if missing > CRITICAL_MISSING {
                Severity::Critical
            } else {
                Severity::Warning
            };
            findings.push(
                Finding::new(
                    NAME,
                    severity,
                    [*low_row, *high_row].into_iter().collect(),
                    missing as f64,
                    format!(
                        "{}: {} value(s) missing between {} and {}",
                        field.name, missing, low, high
                    ),
                )
                .with_detail("field", &field.name)
                .with_detail("low", low)
                .with_detail("high", high),
            );
        }
        Ok(findings)
    }
}

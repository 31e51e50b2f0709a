//! BENFORD: first-digit conformity test.

use ak_common::{DetectionError, Finding, RowId, Severity, Value};
use ak_math::benford::{expected_distribution, Conformity, DigitCounts};
use ak_math::{leading_digit, leading_digit_u64};
use std::collections::BTreeSet;

use super::{DetectionContext, DetectionFunction, ParamSchema, ParamSpec, Params};

pub const NAME: &str = "BENFORD";

#[derive(Debug, Clone, Copy, Default)]
pub struct Benford;

/// Per-shard digit tallies plus the rows behind each digit.
#[derive(Debug, Default)]
struct DigitTally {
    counts: DigitCounts,
    rows: [Vec<RowId>; 9],
}

impl DetectionFunction for Benford {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Leading-digit distribution of positive values compared with Benford's law (MAD)"
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec::field("field")
            .numeric()
            .describe("Numeric field; only strictly positive values are counted")])
    }

    fn run(
        &self,
        ctx: &DetectionContext<'_>,
        params: &Params,
    ) -> Result<Vec<Finding>, DetectionError> {
        let field = params.field(NAME, "field")?;

        let partials = ctx.map_shards(|range| {
            let mut tally = DigitTally::default();
            for (row, value) in ctx.table.column_range(field.position, range) {
                if let Some(d) = first_digit(value) {
                    tally.counts.record(d);
                    tally.rows[usize::from(d - 1)].push(row);
                }
            }
            tally
        })?;

        let mut total = DigitTally::default();
        for part in partials {
            total.counts = total.counts.merge(&part.counts);
            for (acc, rows) in total.rows.iter_mut().zip(part.rows) {
                acc.extend(rows);
            }
        }

        let (Some(mad), Some(observed), Some(digit)) = (
            total.counts.mad(),
            total.counts.proportions(),
            total.counts.most_deviant_digit(),
        ) else {
            return Ok(Vec::new());
        };

        let conformity = Conformity::from_mad(mad);
        let severity = severity_for(conformity);
        let sample_size = total.counts.total();
        let affected: BTreeSet<RowId> = total.rows[usize::from(digit - 1)].iter().copied().collect();

        let finding = Finding::new(
            NAME,
            severity,
            affected,
            mad,
            format!(
                "{}: first-digit MAD {:.4} over {} values ({}); digit {} deviates most",
                field.name, mad, sample_size, conformity, digit
            ),
        )
        .with_detail("field", &field.name)
        .with_detail("conformity", conformity.as_str())
        .with_detail("sample_size", sample_size)
        .with_detail("most_deviant_digit", digit)
        .with_detail("observed", observed)
        .with_detail("expected", expected_distribution())
        .with_detail("counts", total.counts.0);
        Ok(vec![finding])
    }
}

pub fn severity_for(conformity: Conformity) -> Severity {
    match conformity {
        Conformity::Close | Conformity::Acceptable => Severity::Info,
        Conformity::Marginal => Severity::Warning,
        Conformity::Nonconformance => Severity::Critical,
    }
}

/// Leading digit of a strictly positive numeric value.
fn first_digit(value: &Value) -> Option<u8> {
    match value {
        Value::Integer(v) if *v > 0 => leading_digit_u64(*v as u64),
        Value::Currency(cents) if *cents > 0 => leading_digit(*cents as f64 / 100.0),
        Value::Float(v) if *v > 0.0 => leading_digit(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{CancelToken, WorkerPool};
    use crate::table::{load_rows, InMemoryTable};
    use ak_common::{DataType, FieldSchema, TableSchema};
    use serde_json::json;

    fn table(data_type: DataType, values: Vec<serde_json::Value>) -> InMemoryTable {
        let mut table = InMemoryTable::new(TableSchema::new(
            "t",
            vec![
                FieldSchema::new("id", DataType::Integer).primary_key(),
                FieldSchema::new("x", data_type).nullable(),
            ],
        ))
        .unwrap();
        let rows: Vec<_> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| json!({"id": i, "x": v}))
            .collect();
        load_rows(&mut table, &rows);
        table
    }

    fn run(table: &InMemoryTable, workers: usize) -> Vec<Finding> {
        let cancel = CancelToken::new();
        let ctx = DetectionContext::new(table, WorkerPool::new(workers), 100, &cancel);
        let params = Benford
            .param_schema()
            .resolve(NAME, &json!({"field": "x"}), table.schema())
            .unwrap();
        Benford.run(&ctx, &params).unwrap()
    }

    #[test]
    fn powers_of_two_conform() {
        // Leading digits of 2^n follow Benford's law closely.
        let values: Vec<_> = (0..1000).map(|n| json!(2f64.powi(n))).collect();
        let findings = run(&table(DataType::Float, values), 4);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert!(findings[0].metric_value < 0.012);
    }

    #[test]
    fn uniform_leading_digits_do_not_conform() {
        let values: Vec<_> = (0..900).map(|i| json!((i % 9 + 1) * 100 + i % 97)).collect();
        let findings = run(&table(DataType::Integer, values), 2);
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.details["conformity"], "nonconformance");
        // Digit 1 is the most under-represented under a uniform distribution.
        assert_eq!(f.details["most_deviant_digit"], 1);
        assert_eq!(f.affected_row_ids.len(), 100);
    }

    /// Rounded Benford counts for 9999 values.
    const BENFORD_COUNTS: [usize; 9] = [3010, 1761, 1249, 969, 792, 669, 580, 511, 458];

    /// Benford counts with `moved` values shifted from digit 1 to digit 9.
    /// Each shifted value adds 2/(9 * 9999) to the MAD.
    fn skewed(moved: usize) -> InMemoryTable {
        let mut counts = BENFORD_COUNTS;
        counts[0] -= moved;
        counts[8] += moved;
        let values: Vec<_> = counts
            .iter()
            .enumerate()
            .flat_map(|(d, &n)| (0..n).map(move |i| json!((d + 1) * 100 + i % 100)))
            .collect();
        table(DataType::Integer, values)
    }

    #[test]
    fn severity_tracks_each_conformity_tier() {
        let cases = [
            (0, "close", Severity::Info),
            (266, "close", Severity::Info),
            (274, "acceptable", Severity::Info),
            (536, "acceptable", Severity::Info),
            (544, "marginal", Severity::Warning),
            (607, "marginal", Severity::Warning),
            (690, "nonconformance", Severity::Critical),
        ];
        for (moved, label, severity) in cases {
            let findings = run(&skewed(moved), 3);
            assert_eq!(findings.len(), 1, "moved {moved}");
            let f = &findings[0];
            assert_eq!(f.details["conformity"], label, "moved {moved}, mad {}", f.metric_value);
            assert_eq!(f.severity, severity, "moved {moved}");
        }
    }

    #[test]
    fn marginal_band_is_a_warning() {
        let findings = run(&skewed(607), 2);
        let f = &findings[0];
        assert!((0.012..0.015).contains(&f.metric_value), "{}", f.metric_value);
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(f.details["conformity"], "marginal");
        // Digit 9 is over-represented by a hair more than digit 1 is short.
        assert_eq!(f.details["most_deviant_digit"], 9);
        assert_eq!(f.affected_row_ids.len(), 1065);
    }

    #[test]
    fn severity_mapping_table() {
        assert_eq!(severity_for(Conformity::Close), Severity::Info);
        assert_eq!(severity_for(Conformity::Acceptable), Severity::Info);
        assert_eq!(severity_for(Conformity::Marginal), Severity::Warning);
        assert_eq!(severity_for(Conformity::Nonconformance), Severity::Critical);
    }

    #[test]
    fn no_positive_values_yields_nothing() {
        let values = vec![json!(0), json!(-5), json!(null), json!(-120)];
        assert!(run(&table(DataType::Integer, values), 1).is_empty());
        assert!(run(&table(DataType::Integer, vec![]), 1).is_empty());
    }

    #[test]
    fn currency_uses_major_units() {
        let values = vec![json!("0.05"), json!("5.00"), json!("50.10")];
        let findings = run(&table(DataType::Currency, values), 1);
        assert_eq!(findings[0].details["counts"][4], 3);
    }

    #[test]
    fn worker_count_does_not_change_output() {
        let values: Vec<_> = (1..2000).map(|i| json!(i * 7 + 3)).collect();
        let t = table(DataType::Integer, values);
        assert_eq!(run(&t, 1), run(&t, 6));
    }
}

//! OUTLIERS: per-row deviation from the column's centre.
//!
//! `zscore` uses the population mean and standard deviation, accumulated per
//! shard with Welford and merged in shard order. `mad` uses the median and the
//! median absolute deviation (modified z-score). A zero spread yields no
//! findings.

use ak_common::{DetectionError, Finding, RowId, Severity};
use ak_math::{abs_zscore, median, median_abs_deviation, merge_all, modified_zscore, Moments};
use std::collections::BTreeSet;

use super::{DetectionContext, DetectionFunction, FieldRef, ParamSchema, ParamSpec, Params};

pub const NAME: &str = "OUTLIERS";
pub const DEFAULT_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Outliers;

impl DetectionFunction for Outliers {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Rows whose numeric value lies more than `threshold` standard scores from the centre"
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::field("field")
                .numeric()
                .describe("Numeric field to test; nulls are skipped"),
            ParamSpec::choice("method", &["zscore", "mad"], "zscore")
                .describe("zscore: population z-score; mad: modified z-score (median/MAD)"),
            ParamSpec::float("threshold", DEFAULT_THRESHOLD)
                .min_exclusive(0.0)
                .describe("Score above which a row is flagged"),
        ])
    }

    fn run(
        &self,
        ctx: &DetectionContext<'_>,
        params: &Params,
    ) -> Result<Vec<Finding>, DetectionError> {
        let field = params.field(NAME, "field")?;
        let threshold = params.float(NAME, "threshold")?;
        match params.choice(NAME, "method")? {
            "mad" => run_mad(ctx, field, threshold),
            _ => run_zscore(ctx, field, threshold),
        }
    }
}

fn run_zscore(
    ctx: &DetectionContext<'_>,
    field: &FieldRef,
    threshold: f64,
) -> Result<Vec<Finding>, DetectionError> {
    let partials = ctx.map_shards(|range| {
        let mut m = Moments::new();
        for (_, value) in ctx.table.column_range(field.position, range) {
            if let Some(v) = value.as_f64() {
                m.push(v);
            }
        }
        m
    })?;
    let moments = merge_all(&partials);
    let (mean, stddev) = match moments.population_stddev() {
        Some(sd) if sd > 0.0 && sd.is_finite() => (moments.mean, sd),
        _ => return Ok(Vec::new()),
    };

    let flagged = scan(ctx, field, |v| abs_zscore(v, mean, stddev), threshold)?;
    Ok(flagged
        .into_iter()
        .map(|(row, value, score)| {
            build_finding(field, "zscore", row, value, score, threshold)
                .with_detail("mean", mean)
                .with_detail("stddev", stddev)
        })
        .collect())
}

fn run_mad(
    ctx: &DetectionContext<'_>,
    field: &FieldRef,
    threshold: f64,
) -> Result<Vec<Finding>, DetectionError> {
    let partials = ctx.map_shards(|range| {
        ctx.table
            .column_range(field.position, range)
            .filter_map(|(_, value)| value.as_f64())
            .collect::<Vec<f64>>()
    })?;
    let values: Vec<f64> = partials.into_iter().flatten().collect();
    let Some(center) = median(&values) else {
        return Ok(Vec::new());
    };
    let mad = match median_abs_deviation(&values, center) {
        Some(mad) if mad > 0.0 => mad,
        _ => return Ok(Vec::new()),
    };

    let flagged = scan(ctx, field, |v| modified_zscore(v, center, mad), threshold)?;
    Ok(flagged
        .into_iter()
        .map(|(row, value, score)| {
            build_finding(field, "mad", row, value, score, threshold)
                .with_detail("median", center)
                .with_detail("mad", mad)
        })
        .collect())
}

/// Second pass: rows scoring strictly above `threshold`, in row order.
fn scan<S>(
    ctx: &DetectionContext<'_>,
    field: &FieldRef,
    score: S,
    threshold: f64,
) -> Result<Vec<(RowId, f64, f64)>, DetectionError>
where
    S: Fn(f64) -> Option<f64> + Sync,
{
    let partials = ctx.map_shards(|range| {
        ctx.table
            .column_range(field.position, range)
            .filter_map(|(row, value)| {
                let v = value.as_f64()?;
                let s = score(v)?;
                (s > threshold).then_some((row, v, s))
            })
            .collect::<Vec<_>>()
    })?;
    Ok(partials.into_iter().flatten().collect())
}

fn build_finding(
    field: &FieldRef,
    method: &str,
    row: RowId,
    value: f64,
    score: f64,
    threshold: f64,
) -> Finding {
    let severity = if score < 2.0 * threshold {
        Severity::Warning
    } else {
        Severity::Critical
    };
    Finding::new(
        NAME,
        severity,
        BTreeSet::from([row]),
        score,
        format!(
            "{} = {} scores {:.2} ({}), threshold {}",
            field.name, value, score, method, threshold
        ),
    )
    .with_detail("field", &field.name)
    .with_detail("value", value)
    .with_detail("method", method)
}

//! DUPLICATES: exact-match grouping on a tuple of key fields.

use ak_common::{DetectionError, Finding, RowId, Severity, Value};
use std::collections::{BTreeSet, HashMap};

use super::{DetectionContext, DetectionFunction, FieldRef, ParamSchema, ParamSpec, Params};

pub const NAME: &str = "DUPLICATES";

/// Groups at or above this size are Critical.
pub const CRITICAL_GROUP_SIZE: usize = 5;

type Groups = HashMap<Vec<Value>, Vec<RowId>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Duplicates;

impl DetectionFunction for Duplicates {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Rows sharing identical values across the key fields (exact, case-sensitive)"
    }

    fn param_schema(&self) -> ParamSchema {
        ParamSchema::new(vec![ParamSpec::field_list("fields")
            .describe("Key fields; rows with a null in any key field are ignored")])
    }

    fn run(
        &self,
        ctx: &DetectionContext<'_>,
        params: &Params,
    ) -> Result<Vec<Finding>, DetectionError> {
        let fields = params.fields(NAME, "fields")?;

        let mut groups: Vec<(Vec<Value>, Vec<RowId>)> = match indexed_single_field(ctx, fields) {
            Some(groups) => groups,
            None => scan_groups(ctx, fields)?,
        };
        groups.retain(|(_, rows)| rows.len() >= 2);
        groups.sort_by_key(|(_, rows)| rows[0]);

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        Ok(groups
            .into_iter()
            .map(|(key, rows)| build_finding(&names, key, rows))
            .collect())
    }
}

/// Single-field keys backed by an index are read straight from it.
fn indexed_single_field(
    ctx: &DetectionContext<'_>,
    fields: &[FieldRef],
) -> Option<Vec<(Vec<Value>, Vec<RowId>)>> {
    let [field] = fields else {
        return None;
    };
    if ctx.table.is_primary_key(field.position) {
        // Primary keys are unique by construction.
        return Some(Vec::new());
    }
    let index = ctx.table.secondary_index(field.position)?;
    Some(
        index
            .iter()
            .filter(|(_, rows)| rows.len() >= 2)
            .map(|(value, rows)| (vec![value.clone()], rows.clone()))
            .collect(),
    )
}

fn scan_groups(
    ctx: &DetectionContext<'_>,
    fields: &[FieldRef],
) -> Result<Vec<(Vec<Value>, Vec<RowId>)>, DetectionError> {
    let partials = ctx.map_shards(|range| {
        let mut groups = Groups::new();
        for id in range {
            let Some(row) = ctx.table.row(id) else {
                continue;
            };
            let key: Option<Vec<Value>> = fields
                .iter()
                .map(|f| row.get(f.position).filter(|v| !v.is_null()).cloned())
                .collect();
            if let Some(key) = key {
                groups.entry(key).or_default().push(id);
            }
        }
        groups
    })?;

    // Shards are merged in order, so each group's rows stay ascending.
    let mut merged = Groups::new();
    for partial in partials {
        for (key, rows) in partial {
            merged.entry(key).or_default().extend(rows);
        }
    }
    Ok(merged.into_iter().collect())
}

fn build_finding(fields: &[&str], key: Vec<Value>, rows: Vec<RowId>) -> Finding {
    let size = rows.len();
    let severity = if size < CRITICAL_GROUP_SIZE {
        Severity::Warning
    } else {
        Severity::Critical
    };
    let rendered: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    let description = format!(
        "{} rows share ({}) = ({})",
        size,
        fields.join(", "),
        rendered.join(", ")
    );
    let key_json: Vec<serde_json::Value> = key.iter().map(Value::to_json).collect();
    Finding::new(
        NAME,
        severity,
        rows.into_iter().collect::<BTreeSet<_>>(),
        size as f64,
        description,
    )
    .with_detail("fields", fields)
    .with_detail("key", key_json)
}

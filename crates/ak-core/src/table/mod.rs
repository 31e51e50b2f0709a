//! In-memory row store with primary-key and secondary hash indices.
//!
//! A table owns its rows (positional, in schema field order) and the indices
//! derived from them. Rows are only ever appended through [`InMemoryTable::commit`],
//! which validates the primary key and updates every index before returning,
//! so readers never observe rows and indices out of step.

pub mod ingest;

use ak_common::{IngestError, RowId, SchemaError, TableError, TableSchema, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub use ingest::{load_rows, validate_row, IngestReport, RejectedRow};

/// A stored row: one value per schema field, in declaration order.
pub type Row = Vec<Value>;

/// Value → row ids, ascending.
pub type HashIndex = HashMap<Value, Vec<RowId>>;

#[derive(Debug)]
pub struct InMemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
    pk_position: usize,
    pk_index: HashMap<Value, RowId>,
    secondary: BTreeMap<usize, HashIndex>,
}

impl InMemoryTable {
    /// Create an empty table. The schema is validated here.
    pub fn new(schema: TableSchema) -> Result<Self, SchemaError> {
        schema.validate()?;
        let pk_position = schema
            .primary_key_position()
            .ok_or(SchemaError::MissingPrimaryKey)?;
        let secondary = schema
            .indexed_positions()
            .into_iter()
            .map(|pos| (pos, HashIndex::new()))
            .collect();
        Ok(InMemoryTable {
            schema,
            rows: Vec::new(),
            pk_position,
            pk_index: HashMap::new(),
            secondary,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> Option<&[Value]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    pub fn value(&self, row: RowId, position: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(position))
    }

    /// Non-null values of one column for a row range, with their row ids.
    pub fn column_range(
        &self,
        position: usize,
        range: std::ops::Range<usize>,
    ) -> impl Iterator<Item = (RowId, &Value)> + '_ {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        self.rows[start..end]
            .iter()
            .enumerate()
            .filter_map(move |(offset, row)| {
                let value = row.get(position)?;
                (!value.is_null()).then_some((start + offset, value))
            })
    }

    /// Secondary index for a field position, if one exists.
    pub fn secondary_index(&self, position: usize) -> Option<&HashIndex> {
        self.secondary.get(&position)
    }

    pub fn is_primary_key(&self, position: usize) -> bool {
        position == self.pk_position
    }

    /// Append a validated row, enforcing primary-key uniqueness.
    ///
    /// On error nothing is written.
    pub fn commit(&mut self, row: Row) -> Result<RowId, IngestError> {
        let key = row
            .get(self.pk_position)
            .cloned()
            .unwrap_or(Value::Null);
        if self.pk_index.contains_key(&key) {
            let field = self.schema.fields[self.pk_position].name.clone();
            return Err(IngestError::DuplicatePrimaryKey {
                field,
                value: key.to_string(),
            });
        }

        let id = self.rows.len();
        self.pk_index.insert(key, id);
        for (pos, index) in self.secondary.iter_mut() {
            match row.get(*pos) {
                Some(value) if !value.is_null() => {
                    index.entry(value.clone()).or_default().push(id);
                }
                _ => {}
            }
        }
        self.rows.push(row);
        Ok(id)
    }

    /// Row ids whose `field` equals `value`, via the primary-key or a
    /// secondary index. Ids are ascending.
    pub fn lookup(&self, field: &str, value: &Value) -> Result<Vec<RowId>, TableError> {
        let position = self
            .schema
            .position(field)
            .ok_or_else(|| TableError::UnknownField {
                table: self.schema.name.clone(),
                field: field.to_string(),
            })?;

        if position == self.pk_position {
            return Ok(self.pk_index.get(value).map(|id| vec![*id]).unwrap_or_default());
        }

        let index = self
            .secondary
            .get(&position)
            .ok_or_else(|| TableError::NotIndexed {
                table: self.schema.name.clone(),
                field: field.to_string(),
            })?;
        Ok(index.get(value).cloned().unwrap_or_default())
    }

    pub fn stats(&self) -> TableStats {
        let mut indices = vec![IndexStats {
            field: self.schema.fields[self.pk_position].name.clone(),
            primary_key: true,
            distinct_keys: self.pk_index.len(),
        }];
        indices.extend(self.secondary.iter().map(|(pos, index)| IndexStats {
            field: self.schema.fields[*pos].name.clone(),
            primary_key: false,
            distinct_keys: index.len(),
        }));
        TableStats {
            name: self.schema.name.clone(),
            row_count: self.rows.len(),
            schema: self.schema.clone(),
            indices,
        }
    }
}

/// Summary returned by `describe`.
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub name: String,
    pub row_count: usize,
    pub schema: TableSchema,
    pub indices: Vec<IndexStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub field: String,
    pub primary_key: bool,
    pub distinct_keys: usize,
}

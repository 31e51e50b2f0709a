//! Detection functions and the registry that dispatches them.
//!
//! A detection function is a named, parameterised, read-only pass over one
//! table that yields [`Finding`]s. Functions see the table through a
//! [`DetectionContext`], which also carries the worker pool and the
//! cancellation flag used to abandon work after a timeout.

pub mod benford;
pub mod duplicates;
pub mod gaps;
pub mod outliers;
pub mod params;
pub mod registry;

pub use benford::Benford;
pub use duplicates::Duplicates;
pub use gaps::Gaps;
pub use outliers::Outliers;
pub use params::{FieldRef, ParamKind, ParamSchema, ParamSpec, ParamValue, Params};
pub use registry::{CatalogEntry, Registry, RegistryError};

use ak_common::{DetectionError, Finding};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::pool::{CancelToken, PoolError, WorkerPool};
use crate::table::InMemoryTable;

/// A named detection pass. Implementations must not depend on worker count
/// or completion order: partial results are merged in shard order.
pub trait DetectionFunction: Send + Sync {
    /// Unique registry name (e.g. `DUPLICATES`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn param_schema(&self) -> ParamSchema;

    /// Scan the table. Parameters have already been validated.
    fn run(&self, ctx: &DetectionContext<'_>, params: &Params)
        -> Result<Vec<Finding>, DetectionError>;
}

/// Read-only view handed to a running detection function.
pub struct DetectionContext<'a> {
    pub table: &'a InMemoryTable,
    pub pool: WorkerPool,
    pub shard_size: usize,
    pub cancel: &'a CancelToken,
}

impl<'a> DetectionContext<'a> {
    pub fn new(
        table: &'a InMemoryTable,
        pool: WorkerPool,
        shard_size: usize,
        cancel: &'a CancelToken,
    ) -> Self {
        DetectionContext {
            table,
            pool,
            shard_size,
            cancel,
        }
    }

    /// Map `f` over the table's shards; results come back in shard order.
    pub fn map_shards<T, F>(&self, f: F) -> Result<Vec<T>, DetectionError>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync,
    {
        self.pool
            .map_shards(self.table.len(), self.shard_size, self.cancel, f)
            .map_err(|e| match e {
                PoolError::Cancelled => DetectionError::Internal("detection cancelled".to_string()),
                PoolError::WorkerPanicked => {
                    DetectionError::Internal("detection worker panicked".to_string())
                }
            })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Detection invocation: `{function, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub function: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl DetectionRequest {
    pub fn new(function: impl Into<String>, params: serde_json::Value) -> Self {
        DetectionRequest {
            function: function.into(),
            params,
        }
    }
}

/// Detection response: `{findings}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub findings: Vec<Finding>,
}

//! The kernel context object.
//!
//! A [`Kernel`] owns the table store, the detection registry, the logical
//! clock, performance metrics and the hex field engine. Tables are handed out
//! as opaque [`TableHandle`]s; each table sits behind its own `RwLock`, so
//! ingestion into one table blocks detections on that table only and any
//! number of detections may read a table concurrently.
//!
//! Every detection call runs on a dedicated thread and is awaited with a
//! wall-clock budget. When the budget expires the caller gets
//! [`DetectionError::Timeout`], the worker's cancel flag is raised, and the
//! worker drops its read lock as soon as it notices.

use ak_common::value::coerce;
use ak_common::{
    DetectionError, Error, Finding, RowId, SchemaError, TableError, TableHandle, TableSchema,
    Tick, Value,
};
use ak_config::{validate_config, KernelConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::detect::{
    CatalogEntry, DetectionContext, DetectionFunction, DetectionRequest, Params, Registry,
    RegistryError,
};
use crate::hexfield::{HexFieldEngine, HexMap};
use crate::logging::{event_names, Stage};
use crate::metrics::{CallStatus, PerfMetrics};
use crate::pool::{CancelToken, WorkerPool};
use crate::table::{self, InMemoryTable, IngestReport, TableStats};

#[derive(Clone)]
struct TableEntry {
    schema: Arc<TableSchema>,
    table: Arc<RwLock<InMemoryTable>>,
}

/// Embedded analytics kernel.
pub struct Kernel {
    config: KernelConfig,
    registry: Registry,
    tables: RwLock<BTreeMap<TableHandle, TableEntry>>,
    next_handle: AtomicU64,
    clock: AtomicU64,
    metrics: PerfMetrics,
    hex: HexFieldEngine,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("tables", &self.tables().len())
            .field("now", &self.now())
            .finish()
    }
}

impl Kernel {
    /// Build a kernel with the built-in detection functions.
    pub fn new(config: KernelConfig) -> Result<Self, Error> {
        validate_config(&config).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Self::build(config))
    }

    pub fn with_defaults() -> Self {
        Self::build(KernelConfig::default())
    }

    fn build(config: KernelConfig) -> Self {
        let metrics = PerfMetrics::new();
        metrics.start();
        Kernel {
            hex: HexFieldEngine::new(config.hex.clone()),
            config,
            registry: Registry::with_builtins(),
            tables: RwLock::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            clock: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &PerfMetrics {
        &self.metrics
    }

    /// Add a detection function. Names must be unique.
    pub fn register(&mut self, function: Arc<dyn DetectionFunction>) -> Result<(), RegistryError> {
        let name = function.name().to_string();
        self.registry.register(function)?;
        info!(
            event = event_names::REGISTRY_FUNCTION_ADDED,
            stage = %Stage::Init,
            function = %name,
            "detection function registered"
        );
        Ok(())
    }

    /// Sorted catalog of registered functions and their parameters.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.registry.catalog()
    }

    // The table map only sees single inserts, removals and clones, so a
    // panic elsewhere cannot leave it half-updated.
    fn tables_read(&self) -> RwLockReadGuard<'_, BTreeMap<TableHandle, TableEntry>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tables_write(&self) -> RwLockWriteGuard<'_, BTreeMap<TableHandle, TableEntry>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, handle: TableHandle) -> Result<TableEntry, TableError> {
        self.tables_read()
            .get(&handle)
            .cloned()
            .ok_or(TableError::NotFound { handle })
    }

    /// Validate `schema` and create an empty table for it.
    pub fn create_table(&self, schema: TableSchema) -> Result<TableHandle, SchemaError> {
        let table = InMemoryTable::new(schema)?;
        let handle = TableHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        info!(
            event = event_names::TABLE_CREATED,
            stage = %Stage::Ingest,
            table = table.name(),
            handle = %handle,
            fields = table.schema().fields.len(),
            "table created"
        );
        let entry = TableEntry {
            schema: Arc::new(table.schema().clone()),
            table: Arc::new(RwLock::new(table)),
        };
        self.tables_write().insert(handle, entry);
        Ok(handle)
    }

    /// Create a table from a `{name, fields: [...]}` JSON document.
    pub fn create_table_from_json(
        &self,
        definition: &serde_json::Value,
    ) -> Result<TableHandle, SchemaError> {
        self.create_table(TableSchema::from_value(definition)?)
    }

    /// Release a table. Returns `false` if the handle was unknown.
    pub fn drop_table(&self, handle: TableHandle) -> bool {
        let removed = self.tables_write().remove(&handle).is_some();
        if removed {
            info!(
                event = event_names::TABLE_DROPPED,
                stage = %Stage::Ingest,
                handle = %handle,
                "table dropped"
            );
        }
        removed
    }

    /// Live table handles in creation order.
    pub fn tables(&self) -> Vec<TableHandle> {
        self.tables_read().keys().copied().collect()
    }

    pub fn schema(&self, handle: TableHandle) -> Result<Arc<TableSchema>, TableError> {
        Ok(self.entry(handle)?.schema)
    }

    /// Validate and commit a batch of JSON rows. Per-row failures land in the
    /// report; only an unknown handle or a poisoned table fails the call.
    #[instrument(skip(self, handle, rows), fields(handle = %handle, rows = rows.len()))]
    pub fn load_rows(
        &self,
        handle: TableHandle,
        rows: &[serde_json::Value],
    ) -> Result<IngestReport, TableError> {
        let entry = self.entry(handle)?;
        let started = Instant::now();
        let report = {
            let mut guard = entry
                .table
                .write()
                .map_err(|_| TableError::Poisoned { handle })?;
            table::load_rows(&mut guard, rows)
        };
        self.metrics
            .record_ingest(report.accepted, report.rejected.len(), started.elapsed());
        Ok(report)
    }

    /// Rows whose indexed `field` equals `value`. A value that cannot be
    /// coerced to the field's type matches nothing.
    pub fn lookup(
        &self,
        handle: TableHandle,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<RowId>, TableError> {
        let entry = self.entry(handle)?;
        let key = entry
            .schema
            .field(field)
            .and_then(|f| coerce(value, f.data_type))
            .unwrap_or(Value::Null);
        let guard = entry
            .table
            .read()
            .map_err(|_| TableError::Poisoned { handle })?;
        guard.lookup(field, &key)
    }

    pub fn describe(&self, handle: TableHandle) -> Result<TableStats, TableError> {
        let entry = self.entry(handle)?;
        let guard = entry
            .table
            .read()
            .map_err(|_| TableError::Poisoned { handle })?;
        Ok(guard.stats())
    }

    /// Current logical time.
    pub fn now(&self) -> Tick {
        Tick(self.clock.load(Ordering::SeqCst))
    }

    /// Move the logical clock forward by `ticks`; returns the new time.
    pub fn advance_clock(&self, ticks: u64) -> Tick {
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(ticks))
            })
            .unwrap_or_else(|t| t);
        Tick(prev).advance(ticks)
    }

    /// Run one detection function under the configured timeout.
    pub fn run(
        &self,
        handle: TableHandle,
        function: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<Finding>, DetectionError> {
        self.run_with_timeout(handle, function, params, self.config.detection_timeout())
    }

    pub fn run_request(
        &self,
        handle: TableHandle,
        request: &DetectionRequest,
    ) -> Result<Vec<Finding>, DetectionError> {
        self.run(handle, &request.function, &request.params)
    }

    pub fn run_with_timeout(
        &self,
        handle: TableHandle,
        function: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<Finding>, DetectionError> {
        self.dispatch(handle, function, params, timeout, self.config.max_workers)
    }

    /// Run several requests concurrently, each under its own timeout.
    /// Results come back in request order.
    pub fn run_many(
        &self,
        handle: TableHandle,
        requests: &[DetectionRequest],
    ) -> Vec<Result<Vec<Finding>, DetectionError>> {
        if requests.is_empty() {
            return Vec::new();
        }
        let outer = self.config.max_workers.clamp(1, requests.len());
        let inner = (self.config.max_workers / outer).max(1);
        let timeout = self.config.detection_timeout();
        let never = CancelToken::new();
        let results = WorkerPool::new(outer).map_indexed(requests.len(), &never, |i| {
            let request = &requests[i];
            self.dispatch(handle, &request.function, &request.params, timeout, inner)
        });
        match results {
            Ok(results) => results,
            Err(e) => requests
                .iter()
                .map(|_| Err(DetectionError::Internal(e.to_string())))
                .collect(),
        }
    }

    #[instrument(skip(self, handle, params), fields(handle = %handle))]
    fn dispatch(
        &self,
        handle: TableHandle,
        function: &str,
        params: &serde_json::Value,
        timeout: Duration,
        workers: usize,
    ) -> Result<Vec<Finding>, DetectionError> {
        let func = self.registry.get(function)?;
        let entry = self.entry(handle)?;
        let params = func.param_schema().resolve(function, params, &entry.schema)?;

        info!(
            event = event_names::DETECT_STARTED,
            stage = %Stage::Detect,
            function,
            timeout_ms = timeout.as_millis() as u64,
            workers,
            "detection started"
        );
        let started = Instant::now();
        let job = DetectionJob {
            table: entry.table,
            function: func,
            params,
            pool: WorkerPool::new(workers),
            shard_size: self.config.shard_size,
        };
        let outcome = job.run_with_timeout(timeout);
        let elapsed = started.elapsed();

        match outcome {
            Ok((findings, rows)) => {
                self.metrics
                    .record_detection(function, rows, elapsed, CallStatus::Ok);
                let tick = self.now();
                info!(
                    event = event_names::DETECT_FINISHED,
                    stage = %Stage::Detect,
                    function,
                    findings = findings.len(),
                    rows,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "detection finished"
                );
                Ok(findings.into_iter().map(|f| f.at(tick)).collect())
            }
            Err(err) => {
                let status = match err {
                    DetectionError::Timeout { .. } => {
                        warn!(
                            event = event_names::DETECT_TIMEOUT,
                            stage = %Stage::Detect,
                            function,
                            timeout_ms = timeout.as_millis() as u64,
                            "detection timed out"
                        );
                        CallStatus::Timeout
                    }
                    _ => {
                        warn!(
                            event = event_names::DETECT_FAILED,
                            stage = %Stage::Detect,
                            function,
                            code = err.code(),
                            error = %err,
                            "detection failed"
                        );
                        CallStatus::Failed
                    }
                };
                self.metrics.record_detection(function, 0, elapsed, status);
                Err(err)
            }
        }
    }

    /// Project findings onto the hex field at the current tick. `None` uses
    /// the configured default radius.
    pub fn map_findings(&self, findings: &[Finding], radius: Option<f64>) -> HexMap {
        self.map_findings_at(findings, radius, self.now())
    }

    pub fn map_findings_at(&self, findings: &[Finding], radius: Option<f64>, now: Tick) -> HexMap {
        let radius = radius.unwrap_or(self.config.hex.default_radius);
        self.hex.map(findings, radius, now)
    }
}

/// Everything a detection thread needs, owned.
struct DetectionJob {
    table: Arc<RwLock<InMemoryTable>>,
    function: Arc<dyn DetectionFunction>,
    params: Params,
    pool: WorkerPool,
    shard_size: usize,
}

impl DetectionJob {
    /// Returns the findings and the number of rows scanned.
    fn run_with_timeout(self, timeout: Duration) -> Result<(Vec<Finding>, usize), DetectionError> {
        let name = self.function.name().to_string();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name(format!("ak-detect-{}", name.to_lowercase()))
            .spawn(move || {
                // The receiver is gone after a timeout; nothing to report to.
                let _ = tx.send(self.execute(&worker_cancel));
            })
            .map_err(|e| DetectionError::Internal(format!("cannot spawn detection thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                Err(DetectionError::Timeout {
                    function: name,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(DetectionError::Internal(format!(
                "{name} worker exited without a result"
            ))),
        }
    }

    fn execute(&self, cancel: &CancelToken) -> Result<(Vec<Finding>, usize), DetectionError> {
        let guard = self
            .table
            .read()
            .map_err(|_| DetectionError::Internal("table lock poisoned".to_string()))?;
        let ctx = DetectionContext::new(&guard, self.pool, self.shard_size, cancel);
        let findings = self.function.run(&ctx, &self.params)?;
        Ok((findings, guard.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak_common::{DataType, FieldSchema};
    use serde_json::json;

    fn ledger_schema() -> TableSchema {
        TableSchema::new(
            "ledger",
            vec![
                FieldSchema::new("id", DataType::Integer).primary_key(),
                FieldSchema::new("vendor", DataType::String).indexed(),
                FieldSchema::new("amount", DataType::Currency),
            ],
        )
    }

    fn kernel() -> Kernel {
        let config = KernelConfig {
            max_workers: 4,
            shard_size: 8,
            ..KernelConfig::default()
        };
        Kernel::new(config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = KernelConfig {
            max_workers: 0,
            ..KernelConfig::default()
        };
        assert!(matches!(Kernel::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn handles_are_distinct_and_droppable() {
        let k = kernel();
        let a = k.create_table(ledger_schema()).unwrap();
        let b = k.create_table(ledger_schema()).unwrap();
        assert_ne!(a, b);
        assert_eq!(k.tables(), vec![a, b]);
        assert!(k.drop_table(a));
        assert!(!k.drop_table(a));
        assert!(matches!(
            k.load_rows(a, &[]),
            Err(TableError::NotFound { .. })
        ));
    }

    #[test]
    fn schema_errors_surface_before_table_exists() {
        let k = kernel();
        let bad = TableSchema::new("t", vec![FieldSchema::new("x", DataType::Integer)]);
        assert_eq!(k.create_table(bad), Err(SchemaError::MissingPrimaryKey));
        assert!(k.tables().is_empty());
    }

    #[test]
    fn creates_tables_from_json_definitions() {
        let k = kernel();
        let h = k
            .create_table_from_json(&json!({
                "name": "ledger",
                "fields": [
                    {"name": "id", "type": "integer", "primary_key": true},
                    {"name": "vendor", "type": "string", "indexed": true},
                    {"name": "amount", "type": "currency"}
                ]
            }))
            .unwrap();
        assert_eq!(*k.schema(h).unwrap(), ledger_schema());

        let two_keys = json!({
            "name": "ledger",
            "fields": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "ref", "type": "string", "primary_key": true}
            ]
        });
        assert!(matches!(
            k.create_table_from_json(&two_keys),
            Err(SchemaError::MultiplePrimaryKeys { .. })
        ));
        assert!(matches!(
            k.create_table_from_json(&json!({"name": "ledger", "fields": "id"})),
            Err(SchemaError::Malformed(_))
        ));
        assert_eq!(k.tables(), vec![h]);
    }

    #[test]
    fn lookup_coerces_the_query_value() {
        let k = kernel();
        let h = k.create_table(ledger_schema()).unwrap();
        let report = k
            .load_rows(
                h,
                &[
                    json!({"id": 1, "vendor": "acme", "amount": "10.00"}),
                    json!({"id": 2, "vendor": "acme", "amount": 5}),
                    json!({"id": 3, "vendor": "globex", "amount": 1.5}),
                ],
            )
            .unwrap();
        assert_eq!(report.accepted, 3);
        assert_eq!(k.lookup(h, "vendor", &json!("acme")).unwrap(), vec![0, 1]);
        assert_eq!(k.lookup(h, "id", &json!("3")).unwrap(), vec![2]);
        assert!(k.lookup(h, "id", &json!("nope")).unwrap().is_empty());
        assert!(matches!(
            k.lookup(h, "amount", &json!(5)),
            Err(TableError::NotIndexed { .. })
        ));
        assert!(matches!(
            k.lookup(h, "missing", &json!(5)),
            Err(TableError::UnknownField { .. })
        ));
    }

    #[test]
    fn findings_are_stamped_with_current_tick() {
        let k = kernel();
        let h = k.create_table(ledger_schema()).unwrap();
        k.load_rows(
            h,
            &[
                json!({"id": 1, "vendor": "acme", "amount": "10.00"}),
                json!({"id": 2, "vendor": "acme", "amount": "10.00"}),
            ],
        )
        .unwrap();
        assert_eq!(k.advance_clock(7), Tick(7));
        let findings = k
            .run(h, "DUPLICATES", &json!({"fields": ["vendor", "amount"]}))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detected_at, Tick(7));
        let map = k.map_findings(&findings, None);
        assert_eq!(map.points[0].created_at, Tick(7));
    }

    #[test]
    fn unknown_function_and_table() {
        let k = kernel();
        let h = k.create_table(ledger_schema()).unwrap();
        assert!(matches!(
            k.run(h, "NOPE", &json!({})),
            Err(DetectionError::NotFound { .. })
        ));
        assert!(matches!(
            k.run(TableHandle(999), "BENFORD", &json!({"field": "amount"})),
            Err(DetectionError::TableNotFound { .. })
        ));
        assert!(matches!(
            k.run(h, "OUTLIERS", &json!({"field": "vendor"})),
            Err(DetectionError::InvalidParams { .. })
        ));
    }

    #[test]
    fn run_many_keeps_request_order() {
        let k = kernel();
        let h = k.create_table(ledger_schema()).unwrap();
        let rows: Vec<_> = (0..50)
            .map(|i| json!({"id": i, "vendor": format!("v{}", i % 3), "amount": i * 3 + 1}))
            .collect();
        k.load_rows(h, &rows).unwrap();
        let requests = vec![
            DetectionRequest::new("BENFORD", json!({"field": "amount"})),
            DetectionRequest::new("NOPE", json!({})),
            DetectionRequest::new("DUPLICATES", json!({"fields": ["vendor"]})),
        ];
        let results = k.run_many(h, &requests);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap()[0].function_name == "BENFORD");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().len(), 3);
        let snap = k.metrics().snapshot();
        assert_eq!(snap.detections["DUPLICATES"].calls, 1);
        assert_eq!(snap.ingest.rows, 50);
    }
}

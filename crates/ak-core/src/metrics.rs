//! Performance metrics for ingestion and detection.
//!
//! Purely observational: nothing here gates correctness. `start()` sets a
//! baseline (timestamp and row counter); every ingestion or detection call
//! records its elapsed time and rows processed; `throughput()` reports rows
//! per second since the baseline.
//!
//! With the `metrics` feature the same observations are mirrored into a
//! Prometheus registry and can be rendered in text exposition format:
//!
//! - `ak_rows_ingested_total`, `ak_rows_rejected_total` (counters)
//! - `ak_detections_total{function,status}` (counter)
//! - `ak_detection_duration_seconds{function}` (histogram)
//! - `ak_build_info{version}` (gauge, always 1)

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome label for a detection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    Failed,
    Timeout,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ok => "ok",
            CallStatus::Failed => "failed",
            CallStatus::Timeout => "timeout",
        }
    }
}

/// Accumulated figures for one kind of call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpStats {
    pub calls: u64,
    pub failures: u64,
    pub rows: u64,
    pub total_seconds: f64,
    pub last_seconds: f64,
}

impl OpStats {
    fn record(&mut self, rows: u64, elapsed: Duration, ok: bool) {
        let secs = elapsed.as_secs_f64();
        self.calls += 1;
        if !ok {
            self.failures += 1;
        }
        self.rows += rows;
        self.total_seconds += secs;
        self.last_seconds = secs;
    }
}

/// Serializable view of the collected metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub rows_processed: u64,
    pub rows_since_start: u64,
    pub seconds_since_start: f64,
    pub throughput_rows_per_sec: f64,
    pub ingest: OpStats,
    pub rows_rejected: u64,
    pub detections: BTreeMap<String, OpStats>,
}

#[derive(Debug, Default)]
struct PerfState {
    started_at: Option<Instant>,
    baseline_rows: u64,
    rows_processed: u64,
    rows_rejected: u64,
    ingest: OpStats,
    detections: BTreeMap<String, OpStats>,
}

/// Thread-safe metrics collector owned by a kernel.
pub struct PerfMetrics {
    state: Mutex<PerfState>,
    #[cfg(feature = "metrics")]
    prometheus: Option<prom::PromMetrics>,
}

impl std::fmt::Debug for PerfMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfMetrics")
            .field("state", &*self.lock())
            .finish()
    }
}

impl Default for PerfMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfMetrics {
    pub fn new() -> Self {
        PerfMetrics {
            state: Mutex::new(PerfState::default()),
            #[cfg(feature = "metrics")]
            prometheus: match prom::PromMetrics::new() {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(error = %e, "prometheus registry unavailable");
                    None
                }
            },
        }
    }

    // Metrics are observational; a panic elsewhere must not disable them.
    fn lock(&self) -> MutexGuard<'_, PerfState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the throughput baseline to now and the current row count.
    pub fn start(&self) {
        let mut state = self.lock();
        state.started_at = Some(Instant::now());
        state.baseline_rows = state.rows_processed;
    }

    pub fn record_ingest(&self, accepted: usize, rejected: usize, elapsed: Duration) {
        let rows = (accepted + rejected) as u64;
        {
            let mut state = self.lock();
            state.rows_processed += rows;
            state.rows_rejected += rejected as u64;
            state.ingest.record(rows, elapsed, true);
        }
        self.mirror_ingest(accepted, rejected);
    }

    pub fn record_detection(
        &self,
        function: &str,
        rows: usize,
        elapsed: Duration,
        status: CallStatus,
    ) {
        {
            let mut state = self.lock();
            state.rows_processed += rows as u64;
            state
                .detections
                .entry(function.to_string())
                .or_default()
                .record(rows as u64, elapsed, status == CallStatus::Ok);
        }
        self.mirror_detection(function, elapsed, status);
    }

    #[cfg(feature = "metrics")]
    fn mirror_ingest(&self, accepted: usize, rejected: usize) {
        if let Some(p) = &self.prometheus {
            p.rows_ingested_total.inc_by(accepted as u64);
            p.rows_rejected_total.inc_by(rejected as u64);
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn mirror_ingest(&self, _accepted: usize, _rejected: usize) {}

    #[cfg(feature = "metrics")]
    fn mirror_detection(&self, function: &str, elapsed: Duration, status: CallStatus) {
        if let Some(p) = &self.prometheus {
            p.detections_total
                .with_label_values(&[function, status.as_str()])
                .inc();
            p.detection_duration_seconds
                .with_label_values(&[function])
                .observe(elapsed.as_secs_f64());
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn mirror_detection(&self, _function: &str, _elapsed: Duration, _status: CallStatus) {}

    /// Rows per second since `start()`. Zero before `start()` or when no
    /// time has elapsed.
    pub fn throughput(&self) -> f64 {
        let state = self.lock();
        throughput_of(&state)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            rows_processed: state.rows_processed,
            rows_since_start: state.rows_processed.saturating_sub(state.baseline_rows),
            seconds_since_start: state
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            throughput_rows_per_sec: throughput_of(&state),
            ingest: state.ingest.clone(),
            rows_rejected: state.rows_rejected,
            detections: state.detections.clone(),
        }
    }

    /// Render the Prometheus registry in text exposition format.
    #[cfg(feature = "metrics")]
    pub fn render_prometheus(&self) -> String {
        self.prometheus
            .as_ref()
            .map(prom::PromMetrics::render)
            .unwrap_or_default()
    }
}

fn throughput_of(state: &PerfState) -> f64 {
    let Some(started) = state.started_at else {
        return 0.0;
    };
    let secs = started.elapsed().as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    state.rows_processed.saturating_sub(state.baseline_rows) as f64 / secs
}

#[cfg(feature = "metrics")]
mod prom {
    use prometheus::{
        Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
        Registry, TextEncoder,
    };

    pub struct PromMetrics {
        pub registry: Registry,
        pub rows_ingested_total: IntCounter,
        pub rows_rejected_total: IntCounter,
        pub detections_total: IntCounterVec,
        pub detection_duration_seconds: HistogramVec,
    }

    impl PromMetrics {
        pub fn new() -> Result<Self, prometheus::Error> {
            let registry = Registry::new();

            let rows_ingested_total = IntCounter::with_opts(Opts::new(
                "ak_rows_ingested_total",
                "Rows accepted into kernel tables",
            ))?;
            registry.register(Box::new(rows_ingested_total.clone()))?;

            let rows_rejected_total = IntCounter::with_opts(Opts::new(
                "ak_rows_rejected_total",
                "Rows rejected during ingestion",
            ))?;
            registry.register(Box::new(rows_rejected_total.clone()))?;

            let detections_total = IntCounterVec::new(
                Opts::new("ak_detections_total", "Detection calls by function and status"),
                &["function", "status"],
            )?;
            registry.register(Box::new(detections_total.clone()))?;

            let detection_duration_seconds = HistogramVec::new(
                HistogramOpts::new(
                    "ak_detection_duration_seconds",
                    "Wall time of detection calls",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
                &["function"],
            )?;
            registry.register(Box::new(detection_duration_seconds.clone()))?;

            let build_info = IntGauge::with_opts(
                Opts::new("ak_build_info", "Build information")
                    .const_label("version", env!("CARGO_PKG_VERSION")),
            )?;
            build_info.set(1);
            registry.register(Box::new(build_info))?;

            Ok(PromMetrics {
                registry,
                rows_ingested_total,
                rows_rejected_total,
                detections_total,
                detection_duration_seconds,
            })
        }

        pub fn render(&self) -> String {
            let encoder = TextEncoder::new();
            let families = self.registry.gather();
            let mut buf = Vec::new();
            if let Err(e) = encoder.encode(&families, &mut buf) {
                tracing::warn!(error = %e, "failed to encode prometheus metrics");
                return String::new();
            }
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}

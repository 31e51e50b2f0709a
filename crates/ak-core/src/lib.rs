//! Audit Kernel Core Library
//!
//! This library provides the embedded analytics kernel:
//! - Typed in-memory tables with primary-key and secondary indices
//! - Row ingestion with per-row validation reports
//! - A registry of detection functions (duplicates, outliers, Benford, gaps)
//! - A bounded worker pool with order-fixed merges
//! - Performance metrics
//! - The hexagon risk-field engine
//! - Exit codes and structured logging for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod detect;
pub mod exit_codes;
pub mod hexfield;
pub mod kernel;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod synth;
pub mod table;

pub use detect::{DetectionFunction, DetectionRequest, DetectionResponse, Registry};
pub use hexfield::{HexFieldEngine, HexMap, RiskLevel};
pub use kernel::Kernel;
pub use metrics::{MetricsSnapshot, PerfMetrics};
pub use table::{InMemoryTable, IngestReport};

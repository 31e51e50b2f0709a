//! Stable event names and pipeline stages attached to log records.

use serde::{Deserialize, Serialize};

/// Processing stages in the audit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Schema creation and row loading.
    Ingest,
    /// Detection function execution.
    Detect,
    /// Hex risk-field mapping.
    Map,
    /// Output assembly.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Ingest => "ingest",
            Stage::Detect => "detect",
            Stage::Map => "map",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Table lifecycle
    pub const TABLE_CREATED: &str = "table.created";
    pub const TABLE_DROPPED: &str = "table.dropped";

    // Ingestion
    pub const INGEST_STARTED: &str = "ingest.started";
    pub const INGEST_ROW_REJECTED: &str = "ingest.row_rejected";
    pub const INGEST_FINISHED: &str = "ingest.finished";

    // Detection
    pub const DETECT_STARTED: &str = "detect.started";
    pub const DETECT_FINISHED: &str = "detect.finished";
    pub const DETECT_FAILED: &str = "detect.failed";
    pub const DETECT_TIMEOUT: &str = "detect.timeout";
    pub const REGISTRY_FUNCTION_ADDED: &str = "registry.function_added";

    // Hex field
    pub const HEXMAP_FINISHED: &str = "hexmap.finished";
    pub const HEXMAP_SKIPPED: &str = "hexmap.skipped";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";

    // CLI
    pub const AUDIT_FINISHED: &str = "audit.finished";
    pub const COMMAND_FAILED: &str = "command.failed";
}

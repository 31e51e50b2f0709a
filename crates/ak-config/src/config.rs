//! Typed kernel configuration.
//!
//! Loaded from TOML (or JSON, by extension) and layered over built-in
//! defaults. Every field is optional in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::validate::ValidationError;

/// Upper bound on the detection worker pool.
pub const MAX_WORKERS: usize = 256;

/// Rows per detection partition.
pub const DEFAULT_SHARD_SIZE: usize = 4096;

/// Per-call detection timeout.
pub const DEFAULT_DETECTION_TIMEOUT_MS: u64 = 30_000;

/// Kernel-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Schema version of the configuration file.
    pub schema_version: String,

    /// Upper bound on concurrent detection workers.
    pub max_workers: usize,

    /// Rows per partition. Partitioning is independent of `max_workers`.
    pub shard_size: usize,

    /// Wall-clock budget per detection call.
    pub detection_timeout_ms: u64,

    /// Hex risk-field constants.
    pub hex: HexConfig,
}

/// Hex risk-field constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HexConfig {
    /// Cell radius used when a caller does not pass one.
    pub default_radius: f64,

    /// Ticks for a point's contribution to halve.
    pub half_life_ticks: f64,

    /// Side of the square plane findings are projected onto.
    pub plane_extent: f64,

    /// Decayed average severity at or above which a region is YELLOW.
    pub yellow_threshold: f64,

    /// Decayed average severity at or above which a region is RED.
    pub red_threshold: f64,
}

impl Default for HexConfig {
    fn default() -> Self {
        HexConfig {
            default_radius: 5.0,
            half_life_ticks: 10.0,
            plane_extent: 100.0,
            yellow_threshold: 1.5,
            red_threshold: 2.5,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            max_workers: default_max_workers(),
            shard_size: DEFAULT_SHARD_SIZE,
            detection_timeout_ms: DEFAULT_DETECTION_TIMEOUT_MS,
            hex: HexConfig::default(),
        }
    }
}

/// Available parallelism, clamped to `1..=MAX_WORKERS`.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_WORKERS)
}

impl KernelConfig {
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ValidationError> {
        toml::from_str(raw).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(raw).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    /// Parse file content, choosing the format from the path's extension
    /// (`.json` is JSON, anything else TOML).
    pub fn parse_for_path(path: &Path, raw: &str) -> Result<Self, ValidationError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(raw),
            _ => Self::from_toml_str(raw),
        }
    }

    /// Canonical TOML rendering, used for `check-config` output.
    pub fn to_toml_string(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self).map_err(|e| ValidationError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = KernelConfig::default();
        assert!(cfg.max_workers >= 1 && cfg.max_workers <= MAX_WORKERS);
        assert_eq!(cfg.shard_size, 4096);
        assert_eq!(cfg.detection_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.hex.red_threshold, 2.5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = KernelConfig::from_toml_str(
            r#"
            max_workers = 8

            [hex]
            half_life_ticks = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.shard_size, DEFAULT_SHARD_SIZE);
        assert_eq!(cfg.hex.half_life_ticks, 4.0);
        assert_eq!(cfg.hex.default_radius, 5.0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = KernelConfig::from_toml_str("max_wrokers = 2").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn json_chosen_by_extension() {
        let cfg =
            KernelConfig::parse_for_path(Path::new("kernel.JSON"), r#"{"shard_size": 128}"#)
                .unwrap();
        assert_eq!(cfg.shard_size, 128);
    }

    #[test]
    fn toml_rendering_parses_back() {
        let cfg = KernelConfig::default();
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(KernelConfig::from_toml_str(&text).unwrap(), cfg);
    }
}

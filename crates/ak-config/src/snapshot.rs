//! Configuration snapshots for audit provenance.
//!
//! A snapshot captures the effective configuration at the start of an audit
//! so that a report can be traced back to the exact settings that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::KernelConfig;
use crate::resolve::{ConfigSource, ResolvedConfig};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration file was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Where the configuration came from.
    pub config_source: String,

    /// SHA-256 of the raw file content.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// Environment overrides applied on top of the file.
    #[serde(default)]
    pub overrides: Vec<String>,

    /// SHA-256 of the effective configuration (file + overrides).
    pub effective_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub max_workers: usize,
    pub shard_size: usize,
    pub detection_timeout_ms: u64,
    pub hex_default_radius: f64,
    pub hex_half_life_ticks: f64,
}

impl ConfigSummary {
    fn from_config(config: &KernelConfig) -> Self {
        ConfigSummary {
            max_workers: config.max_workers,
            shard_size: config.shard_size,
            detection_timeout_ms: config.detection_timeout_ms,
            hex_default_radius: config.hex.default_radius,
            hex_half_life_ticks: config.hex.half_life_ticks,
        }
    }
}

impl ConfigSnapshot {
    /// Create a snapshot from a resolved configuration.
    pub fn new(resolved: &ResolvedConfig) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: resolved.config.schema_version.clone(),
            config_path: resolved.path.as_ref().map(|p| p.display().to_string()),
            config_source: resolved.source.to_string(),
            file_hash: resolved.raw.as_deref().map(hash_content),
            overrides: resolved.overrides.clone(),
            effective_hash: effective_hash(&resolved.config),
            summary: ConfigSummary::from_config(&resolved.config),
        }
    }

    /// Create a snapshot for an in-memory configuration (no file involved).
    pub fn from_config(config: &KernelConfig) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            config_path: None,
            config_source: ConfigSource::BuiltinDefault.to_string(),
            file_hash: None,
            overrides: Vec::new(),
            effective_hash: effective_hash(config),
            summary: ConfigSummary::from_config(config),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot describes the same effective configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }

    /// Short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.effective_hash[..12.min(self.effective_hash.len())]
    }
}

fn effective_hash(config: &KernelConfig) -> String {
    // serde_json emits struct fields in declaration order, so this is stable.
    let canonical = serde_json::to_string(config).unwrap_or_default();
    hash_content(&canonical)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

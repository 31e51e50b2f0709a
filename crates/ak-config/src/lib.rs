//! Audit kernel configuration loading and validation.
//!
//! This crate provides:
//! - The typed `KernelConfig` (workers, partitioning, timeouts, hex field)
//! - Config resolution (CLI → env → XDG → defaults) with env overrides
//! - Semantic validation
//! - Config snapshots for audit provenance

pub mod config;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use config::{HexConfig, KernelConfig};
pub use resolve::{load_config, load_config_with, ConfigError, ConfigSource, ResolvedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{collect_issues, validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

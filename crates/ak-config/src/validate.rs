//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::config::{HexConfig, KernelConfig, MAX_WORKERS};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::ParseError(_) => 52,
            ValidationError::SemanticError(_) => 53,
            ValidationError::InvalidValue { .. } => 54,
            ValidationError::VersionMismatch { .. } => 55,
        }
    }

    fn invalid(field: &str, message: String) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message,
        }
    }
}

/// Validate kernel configuration semantically, stopping at the first problem.
pub fn validate_config(config: &KernelConfig) -> ValidationResult<()> {
    match collect_issues(config).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Every semantic problem in the configuration, in field order.
pub fn collect_issues(config: &KernelConfig) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        issues.push(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.max_workers == 0 || config.max_workers > MAX_WORKERS {
        issues.push(ValidationError::invalid(
            "max_workers",
            format!("Must be in [1, {}], got {}", MAX_WORKERS, config.max_workers),
        ));
    }

    if config.shard_size == 0 {
        issues.push(ValidationError::invalid(
            "shard_size",
            "Must be at least 1".to_string(),
        ));
    }

    if config.detection_timeout_ms == 0 {
        issues.push(ValidationError::invalid(
            "detection_timeout_ms",
            "Must be positive".to_string(),
        ));
    }

    validate_hex(&config.hex, &mut issues);
    issues
}

fn validate_hex(hex: &HexConfig, issues: &mut Vec<ValidationError>) {
    for (field, value) in [
        ("hex.default_radius", hex.default_radius),
        ("hex.half_life_ticks", hex.half_life_ticks),
        ("hex.plane_extent", hex.plane_extent),
    ] {
        if !value.is_finite() || value <= 0.0 {
            issues.push(ValidationError::invalid(
                field,
                format!("Must be positive and finite, got {}", value),
            ));
        }
    }

    let mut thresholds_ok = true;
    for (field, value) in [
        ("hex.yellow_threshold", hex.yellow_threshold),
        ("hex.red_threshold", hex.red_threshold),
    ] {
        // Severity weights live in [1, 3]; a threshold at or below 1 is always met.
        if !(value > 1.0 && value <= 3.0) {
            thresholds_ok = false;
            issues.push(ValidationError::invalid(
                field,
                format!("Must be in (1, 3], got {}", value),
            ));
        }
    }

    if thresholds_ok && hex.yellow_threshold >= hex.red_threshold {
        issues.push(ValidationError::SemanticError(format!(
            "hex.yellow_threshold ({}) must be below hex.red_threshold ({})",
            hex.yellow_threshold, hex.red_threshold
        )));
    }
}

//! Configuration resolution and loading.
//!
//! Resolution order: CLI argument → `AK_CONFIG` → XDG config → defaults.
//! Environment overrides (`AK_MAX_WORKERS`, `AK_DETECTION_TIMEOUT_MS`) are
//! applied on top of whichever source won, then the result is validated.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::KernelConfig;
use crate::validate::{validate_config, ValidationError};

/// Where the configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "AK_CONFIG";
pub const ENV_MAX_WORKERS: &str = "AK_MAX_WORKERS";
pub const ENV_DETECTION_TIMEOUT_MS: &str = "AK_DETECTION_TIMEOUT_MS";

/// Standard config file name.
const CONFIG_FILENAME: &str = "kernel.toml";

/// Application name for XDG directories.
const APP_NAME: &str = "audit-kernel";

/// Failures while locating, reading, or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ValidationError,
    },

    #[error("invalid {var}={value}: expected a positive integer")]
    InvalidOverride { var: String, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigError {
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::NotFound { .. } | ConfigError::Io { .. } => 50,
            ConfigError::InvalidOverride { .. } => 51,
            ConfigError::Parse { source, .. } => source.code(),
            ConfigError::Validation(e) => e.code(),
        }
    }
}

impl From<ConfigError> for ak_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { .. } | ConfigError::Io { .. } => {
                ak_common::Error::Config(err.to_string())
            }
            other => ak_common::Error::InvalidConfig(other.to_string()),
        }
    }
}

/// Configuration after resolution, overrides, and validation.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: KernelConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    /// Raw file content, kept for snapshot hashing.
    pub raw: Option<String>,
    /// Environment overrides that were applied, as `VAR=value`.
    pub overrides: Vec<String>,
}

/// Find the configuration file to use, if any.
///
/// An explicit CLI path or `AK_CONFIG` that does not exist is an error; a
/// missing XDG file silently falls back to defaults.
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<(Option<PathBuf>, ConfigSource), ConfigError> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok((Some(path.to_path_buf()), ConfigSource::CliArgument));
    }

    if let Some(env_path) = env(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(env_path);
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        return Ok((Some(path), ConfigSource::Environment));
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return Ok((Some(path), ConfigSource::XdgConfig));
        }
    }

    Ok((None, ConfigSource::BuiltinDefault))
}

/// Resolve, load, override and validate using the process environment.
pub fn load_config(cli_path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    load_config_with(cli_path, &|key: &str| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with(
    cli_path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let (path, source) = resolve_config_path(cli_path, env)?;

    let (mut config, raw) = match &path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let config =
                KernelConfig::parse_for_path(path, &raw).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            (config, Some(raw))
        }
        None => (KernelConfig::default(), None),
    };

    let overrides = apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;

    Ok(ResolvedConfig {
        config,
        path,
        source,
        raw,
        overrides,
    })
}

fn apply_env_overrides(
    config: &mut KernelConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, ConfigError> {
    let mut applied = Vec::new();

    if let Some(value) = env(ENV_MAX_WORKERS).filter(|v| !v.is_empty()) {
        config.max_workers = parse_positive(ENV_MAX_WORKERS, &value)? as usize;
        applied.push(format!("{}={}", ENV_MAX_WORKERS, value));
    }

    if let Some(value) = env(ENV_DETECTION_TIMEOUT_MS).filter(|v| !v.is_empty()) {
        config.detection_timeout_ms = parse_positive(ENV_DETECTION_TIMEOUT_MS, &value)?;
        applied.push(format!("{}={}", ENV_DETECTION_TIMEOUT_MS, value));
    }

    Ok(applied)
}

fn parse_positive(var: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidOverride {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

/// XDG config directory for the audit kernel.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_missing_cli_path_is_error() {
        let env = env_from(&[]);
        let err = resolve_config_path(Some(Path::new("/nonexistent/kernel.toml")), &env)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert_eq!(err.code(), 50);
    }

    #[test]
    fn test_env_overrides_apply() {
        let env = env_from(&[(ENV_MAX_WORKERS, "3"), (ENV_DETECTION_TIMEOUT_MS, "250")]);
        let mut cfg = KernelConfig::default();
        let applied = apply_env_overrides(&mut cfg, &env).unwrap();
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.detection_timeout_ms, 250);
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn test_bad_override_rejected() {
        let env = env_from(&[(ENV_MAX_WORKERS, "zero")]);
        let mut cfg = KernelConfig::default();
        let err = apply_env_overrides(&mut cfg, &env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));

        let env = env_from(&[(ENV_DETECTION_TIMEOUT_MS, "0")]);
        assert!(apply_env_overrides(&mut cfg, &env).is_err());
    }

    #[test]
    fn test_config_error_maps_to_common_error() {
        let err: ak_common::Error = ConfigError::InvalidOverride {
            var: ENV_MAX_WORKERS.to_string(),
            value: "x".to_string(),
        }
        .into();
        assert_eq!(err.code(), 51);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }
}

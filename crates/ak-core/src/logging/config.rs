//! Log configuration resolved from the environment and CLI flags.
//!
//! Precedence, lowest first: built-in default (`warn`, human), `RUST_LOG`
//! directives, `AK_LOG` level, `AK_LOG_FORMAT`, then `-v`/`-q` and
//! `--log-format`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Crates whose records pass the level filter.
const KERNEL_TARGETS: [&str; 4] = ["ak_core", "ak_config", "ak_common", "ak_math"];

/// Shape of log records on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Console lines for interactive use
    #[default]
    #[value(alias = "console")]
    Human,

    /// One JSON object per record
    #[value(alias = "json")]
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogFormat as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| format!("unknown log format: {s}"))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "warning" => return Ok(LogLevel::Warn),
            "none" | "quiet" => return Ok(LogLevel::Off),
            _ => {}
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Raw `RUST_LOG` directives; only used while no explicit level is set.
    pub directives: Option<String>,
    /// Timestamps on human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Warn,
            directives: None,
            timestamps: true,
        }
    }
}

impl LogConfig {
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_env_with(cli_level, cli_format, |key| std::env::var(key).ok())
    }

    /// [`LogConfig::from_env`] with an injectable environment lookup.
    pub fn from_env_with(
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = LogConfig {
            directives: env("RUST_LOG").filter(|d| !d.trim().is_empty()),
            ..LogConfig::default()
        };

        if let Some(level) = env("AK_LOG").and_then(|v| v.parse::<LogLevel>().ok()) {
            config = config.with_level(level);
        }
        if let Some(format) = env("AK_LOG_FORMAT").and_then(|v| v.parse::<LogFormat>().ok()) {
            config.format = format;
        }
        if let Some(level) = cli_level {
            config = config.with_level(level);
        }
        if let Some(format) = cli_format {
            config.format = format;
        }
        config
    }

    /// Build the subscriber filter. Unparseable directives fall back to the
    /// level filter.
    pub fn filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| {
                let level = self.level;
                let directives: Vec<String> = KERNEL_TARGETS
                    .iter()
                    .map(|target| format!("{target}={level}"))
                    .collect();
                EnvFilter::new(directives.join(","))
            })
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set an explicit level; this discards `RUST_LOG` directives.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.directives = None;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parses_formats_and_levels() {
        assert_eq!("human".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Jsonl));
        assert!("xml".parse::<LogFormat>().is_err());

        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("quiet".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert_eq!(" TRACE ".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn rust_log_directives_are_kept_verbatim() {
        let cfg = LogConfig::from_env_with(None, None, env(&[("RUST_LOG", "ak_core=debug")]));
        assert_eq!(cfg.directives.as_deref(), Some("ak_core=debug"));
        assert_eq!(cfg.level, LogLevel::Warn);
    }

    #[test]
    fn ak_log_beats_rust_log() {
        let cfg = LogConfig::from_env_with(
            None,
            None,
            env(&[("AK_LOG", "off"), ("RUST_LOG", "ak_core=trace")]),
        );
        assert_eq!(cfg.level, LogLevel::Off);
        assert_eq!(cfg.directives, None);
    }

    #[test]
    fn cli_flags_win() {
        let cfg = LogConfig::from_env_with(
            Some(LogLevel::Info),
            Some(LogFormat::Human),
            env(&[("AK_LOG", "trace"), ("AK_LOG_FORMAT", "jsonl")]),
        );
        assert_eq!(cfg.level, LogLevel::Info);
        assert_eq!(cfg.format, LogFormat::Human);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let cfg = LogConfig::from_env_with(
            None,
            None,
            env(&[("AK_LOG", "loud"), ("AK_LOG_FORMAT", "xml"), ("RUST_LOG", "  ")]),
        );
        assert_eq!(cfg, LogConfig::default());
    }

    #[test]
    fn level_filter_names_every_kernel_crate() {
        let filter = LogConfig::default().with_level(LogLevel::Debug).filter();
        let rendered = filter.to_string();
        for target in KERNEL_TARGETS {
            assert!(rendered.contains(&format!("{target}=debug")), "{rendered}");
        }
    }
}

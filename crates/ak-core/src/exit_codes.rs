//! Exit codes for the ak-core CLI.
//!
//! Exit codes communicate the audit outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-1: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors and timeouts

use ak_common::{DetectionError, Error};

/// Exit codes for ak-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-1)
    // ========================================================================
    /// Success: every detection ran and nothing was found
    Clean = 0,

    /// Every detection ran; at least one finding was reported
    FindingsPresent = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments, unknown function, or invalid detection parameters
    ArgsError = 10,

    /// Malformed or semantically invalid configuration
    ConfigError = 11,

    /// Malformed table definition
    SchemaError = 12,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// A detection exceeded its time budget
    TimeoutError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates a completed run (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::FindingsPresent)
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::FindingsPresent => "OK_FINDINGS",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::SchemaError => "ERR_SCHEMA",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }

    /// Map a kernel error onto the exit code the CLI reports for it.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Schema(_) => ExitCode::SchemaError,
            Error::Config(_) | Error::InvalidConfig(_) => ExitCode::ConfigError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) | Error::Ingest(_) | Error::Table(_) => ExitCode::ArgsError,
            Error::Detection(e) => Self::from_detection(e),
            Error::Mapping(_) => ExitCode::InternalError,
        }
    }

    pub fn from_detection(err: &DetectionError) -> Self {
        match err {
            DetectionError::Timeout { .. } => ExitCode::TimeoutError,
            DetectionError::Internal(_) => ExitCode::InternalError,
            DetectionError::NotFound { .. }
            | DetectionError::InvalidParams { .. }
            | DetectionError::TableNotFound { .. } => ExitCode::ArgsError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ak_common::SchemaError;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::FindingsPresent.is_success());
        assert!(!ExitCode::FindingsPresent.is_error());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::TimeoutError.is_internal_error());
        assert_eq!(i32::from(ExitCode::TimeoutError), 22);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::SchemaError.to_string(), "ERR_SCHEMA (12)");
    }

    #[test]
    fn test_from_error() {
        let timeout = Error::Detection(DetectionError::Timeout {
            function: "OUTLIERS".into(),
            timeout_ms: 10,
        });
        assert_eq!(ExitCode::from_error(&timeout), ExitCode::TimeoutError);
        assert_eq!(
            ExitCode::from_error(&Error::Schema(SchemaError::NoFields)),
            ExitCode::SchemaError
        );
        assert_eq!(
            ExitCode::from_error(&Error::InvalidConfig("x".into())),
            ExitCode::ConfigError
        );
    }
}

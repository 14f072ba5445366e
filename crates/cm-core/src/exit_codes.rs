//! Exit codes for the carrier-master CLI.
//!
//! Exit codes communicate the outcome of a run without requiring output
//! parsing. They are stable.

use cm_common::Error;

/// Exit codes for carrier-master operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    /// Configuration error
    ConfigError = 10,

    /// Structural/integrity failure; nothing was published
    StructuralError = 11,

    /// Feature drift, artifact schema mismatch, or too few labels
    ModelError = 12,

    /// Artifact store or output storage failure
    ArtifactError = 13,

    /// I/O error
    IoError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for a pipeline error.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::Config(_) => ExitCode::ConfigError,
            e if e.is_structural() => ExitCode::StructuralError,
            Error::FeatureMismatch { .. }
            | Error::ArtifactSchemaMismatch { .. }
            | Error::InsufficientLabels { .. } => ExitCode::ModelError,
            Error::Artifact { .. } | Error::Storage { .. } => ExitCode::ArtifactError,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

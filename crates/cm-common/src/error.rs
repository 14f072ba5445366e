//! Error types for the carrier master pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::id::{ArtifactVersion, SnapshotVersion};

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage, used to locate a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Normalize,
    Cargo,
    Link,
    Features,
    Train,
    Score,
    Dqs,
    Assemble,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Cargo => "cargo",
            Stage::Link => "link",
            Stage::Features => "features",
            Stage::Train => "train",
            Stage::Score => "score",
            Stage::Dqs => "dqs",
            Stage::Assemble => "assemble",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened: stage, table, and the versions in play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContext {
    pub stage: Stage,
    pub table: String,
    pub snapshot: Option<String>,
    pub artifact: Option<String>,
}

impl StageContext {
    pub fn new(stage: Stage, table: impl Into<String>) -> Self {
        StageContext {
            stage,
            table: table.into(),
            snapshot: None,
            artifact: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: &SnapshotVersion) -> Self {
        self.snapshot = Some(snapshot.id.clone());
        self
    }

    pub fn with_artifact(mut self, artifact: &ArtifactVersion) -> Self {
        self.artifact = Some(artifact.0.clone());
        self
    }
}

impl fmt::Display for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage={} table={} snapshot={} artifact={}",
            self.stage,
            self.table,
            self.snapshot.as_deref().unwrap_or("-"),
            self.artifact.as_deref().unwrap_or("-")
        )
    }
}

/// Unified error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Structural errors (20-29)
    #[error("schema mismatch [{context}]: missing required columns {missing:?}")]
    SchemaMismatch {
        context: StageContext,
        missing: Vec<String>,
    },

    #[error("key violation [{context}]: {detail}")]
    KeyViolation {
        context: StageContext,
        detail: String,
    },

    #[error("linkage integrity error [{context}]: anchor has {expected} rows, fused table has {actual}")]
    LinkageIntegrity {
        context: StageContext,
        expected: usize,
        actual: usize,
    },

    #[error("assembly count mismatch [{context}]: census anchor has {expected} rows, master table has {actual}")]
    AssemblyCountMismatch {
        context: StageContext,
        expected: usize,
        actual: usize,
    },

    // Model errors (30-39)
    #[error("feature mismatch [{context}]: {detail}")]
    FeatureMismatch {
        context: StageContext,
        detail: String,
    },

    #[error("artifact schema mismatch [{context}]: {detail}")]
    ArtifactSchemaMismatch {
        context: StageContext,
        detail: String,
    },

    #[error("insufficient labels [{context}]: {found} usable, {required} required ({reason})")]
    InsufficientLabels {
        context: StageContext,
        found: usize,
        required: usize,
        reason: String,
    },

    // Persistence errors (40-49)
    #[error("artifact error [{context}]: {detail}")]
    Artifact {
        context: StageContext,
        detail: String,
    },

    #[error("storage error [{context}]: {detail}")]
    Storage {
        context: StageContext,
        detail: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::SchemaMismatch { .. } => 20,
            Error::KeyViolation { .. } => 21,
            Error::LinkageIntegrity { .. } => 22,
            Error::AssemblyCountMismatch { .. } => 23,
            Error::FeatureMismatch { .. } => 30,
            Error::ArtifactSchemaMismatch { .. } => 31,
            Error::InsufficientLabels { .. } => 32,
            Error::Artifact { .. } => 40,
            Error::Storage { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Structural/integrity failures. A snapshot run hitting one of these
    /// publishes nothing.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::SchemaMismatch { .. }
                | Error::KeyViolation { .. }
                | Error::LinkageIntegrity { .. }
                | Error::AssemblyCountMismatch { .. }
        )
    }

    /// Stage context, when the error carries one.
    pub fn context(&self) -> Option<&StageContext> {
        match self {
            Error::SchemaMismatch { context, .. }
            | Error::KeyViolation { context, .. }
            | Error::LinkageIntegrity { context, .. }
            | Error::AssemblyCountMismatch { context, .. }
            | Error::FeatureMismatch { context, .. }
            | Error::ArtifactSchemaMismatch { context, .. }
            | Error::InsufficientLabels { context, .. }
            | Error::Artifact { context, .. }
            | Error::Storage { context, .. } => Some(context),
            Error::Config(_) | Error::Io(_) | Error::Json(_) => None,
        }
    }
}

//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("vocabulary hash mismatch: expected {expected}, got {actual}")]
    VocabularyHashMismatch { expected: String, actual: String },
}

impl From<ConfigError> for cm_common::Error {
    fn from(err: ConfigError) -> Self {
        cm_common::Error::Config(err.to_string())
    }
}

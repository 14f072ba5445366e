//! Artifact bundle and store errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("artifact store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("artifact entry encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry's bytes no longer hash to the digest recorded in the manifest.
    #[error("artifact entry '{path}' was modified: manifest sha256 {expected}, content sha256 {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("artifact is missing entry '{0}'")]
    MissingFile(String),

    #[error("artifact format {version} cannot be read (this build reads {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("artifact manifest rejected: {0}")]
    CorruptedManifest(String),

    /// Malformed id, or an id whose hash suffix disagrees with the content.
    #[error("artifact version '{0}' is malformed or does not match its content")]
    InvalidVersion(String),

    #[error("artifact {0} is already published and cannot be replaced")]
    VersionExists(String),

    #[error("artifact {0} is not in the store")]
    NotFound(String),

    #[error("no artifact has been published yet; run `train` first")]
    EmptyStore,
}

pub type Result<T> = std::result::Result<T, BundleError>;

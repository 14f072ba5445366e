//! Table storage errors.

use std::path::PathBuf;
use thiserror::Error;

use cm_common::StageContext;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported table format: {0}")]
    UnsupportedFormat(PathBuf),
}

impl TableError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TableError::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach stage/table context for the pipeline error taxonomy.
    pub fn in_context(self, context: StageContext) -> cm_common::Error {
        cm_common::Error::Storage {
            context,
            detail: self.to_string(),
        }
    }
}

//! Parquet and JSON writers with atomic publish.
//!
//! Output is written to a sibling temp file and renamed into place, so a
//! reader never sees a partially written table.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tracing::debug;

use crate::error::TableError;

/// Parquet writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub compression: Compression,
    /// Maximum rows per row group.
    pub max_row_group_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: Compression::ZSTD(ZstdLevel::default()),
            max_row_group_size: 64 * 1024,
        }
    }
}

impl WriterConfig {
    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.max_row_group_size)
            .build()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn publish(tmp: &Path, path: &Path) -> Result<(), TableError> {
    fs::rename(tmp, path).map_err(|e| TableError::io(path, e))
}

/// Write a single batch to `path` as Parquet. Returns the number of rows.
pub fn write_parquet_atomic(
    path: &Path,
    batch: &RecordBatch,
    config: &WriterConfig,
) -> Result<usize, TableError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TableError::io(parent, e))?;
    }
    let tmp = temp_path(path);
    let result = (|| -> Result<(), TableError> {
        let file = File::create(&tmp).map_err(|e| TableError::io(&tmp, e))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(config.properties()))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    publish(&tmp, path)?;
    debug!(path = %path.display(), rows = batch.num_rows(), "parquet written");
    Ok(batch.num_rows())
}

/// Write a value as pretty JSON to `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), TableError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TableError::io(parent, e))?;
    }
    let tmp = temp_path(path);
    let result = (|| -> Result<(), TableError> {
        let file = File::create(&tmp).map_err(|e| TableError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n").map_err(|e| TableError::io(&tmp, e))?;
        writer.flush().map_err(|e| TableError::io(&tmp, e))?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    publish(&tmp, path)
}

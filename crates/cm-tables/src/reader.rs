//! Raw source readers.
//!
//! CSV files are read with every column forced to `Utf8` so no value is
//! reinterpreted before normalization (leading zeros in ZIP codes, `NA`
//! markers). Parquet columns of any type are rendered with Arrow's display
//! formatting.

use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::Array;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::TableError;
use crate::raw::RawTable;

const CSV_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(TableFormat::Csv),
            "parquet" | "pq" => Some(TableFormat::Parquet),
            _ => None,
        }
    }
}

/// Read one file into a raw table named `name`.
pub fn read_table(path: &Path, name: &str) -> Result<RawTable, TableError> {
    let format =
        TableFormat::from_path(path).ok_or_else(|| TableError::UnsupportedFormat(path.to_path_buf()))?;
    let table = match format {
        TableFormat::Csv => read_csv(path, name)?,
        TableFormat::Parquet => read_parquet(path, name)?,
    };
    debug!(
        table = name,
        path = %path.display(),
        rows = table.len(),
        columns = table.columns.len(),
        "raw table read"
    );
    Ok(table)
}

/// Read and concatenate several files (e.g. year partitions) of one source.
pub fn read_tables(paths: &[PathBuf], name: &str) -> Result<RawTable, TableError> {
    let mut combined = RawTable::new(name, Vec::new());
    for path in paths {
        combined.append(read_table(path, name)?);
    }
    Ok(combined)
}

fn read_csv(path: &Path, name: &str) -> Result<RawTable, TableError> {
    let mut file = File::open(path).map_err(|e| TableError::io(path, e))?;
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(BufReader::new(&mut file), Some(1))?;
    file.rewind().map_err(|e| TableError::io(path, e))?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(file)?;

    let mut table = RawTable::new(name, column_names(&schema));
    for batch in reader {
        append_batch(&mut table, &batch?)?;
    }
    Ok(table)
}

fn read_parquet(path: &Path, name: &str) -> Result<RawTable, TableError> {
    let file = File::open(path).map_err(|e| TableError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut table = RawTable::new(name, column_names(&schema));
    for batch in reader {
        append_batch(&mut table, &batch?)?;
    }
    Ok(table)
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

fn append_batch(table: &mut RawTable, batch: &RecordBatch) -> Result<(), TableError> {
    let start = table.rows.len();
    table
        .rows
        .extend((0..batch.num_rows()).map(|_| Vec::with_capacity(batch.num_columns())));
    for column in batch.columns() {
        for row in 0..batch.num_rows() {
            let cell = if column.is_null(row) {
                None
            } else {
                Some(array_value_to_string(column, row)?)
            };
            table.rows[start + row].push(cell);
        }
    }
    Ok(())
}

/// SHA-256 of a file's bytes, for provenance pinning.
pub fn hash_file(path: &Path) -> Result<String, TableError> {
    let mut file = File::open(path).map_err(|e| TableError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| TableError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

//! Carrier master table storage.
//!
//! This crate provides:
//! - Raw table readers (CSV and Parquet) into string-celled [`RawTable`]s
//! - Arrow schema definitions for the published tables
//! - Record-to-Arrow conversion
//! - Parquet and JSON writers that publish atomically

pub mod convert;
pub mod error;
pub mod raw;
pub mod reader;
pub mod schema;
pub mod writer;

pub use convert::{master_batch, unresolved_crash_batch};
pub use error::TableError;
pub use raw::RawTable;
pub use reader::{hash_file, read_table, read_tables, TableFormat};
pub use schema::{master_schema, unresolved_crash_schema, TableName, SCHEMA_VERSION_KEY};
pub use writer::{write_json_atomic, write_parquet_atomic, WriterConfig};

/// Schema version for published tables.
pub const SCHEMA_VERSION: &str = "1.0.0";

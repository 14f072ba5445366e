//! Source normalizer.
//!
//! Turns a [`RawTable`] into a [`CanonicalTable`]: one typed carrier-id key
//! per row, canonical column names in mapping order, and explicit
//! [`Value::Null`] for every missing, blank, or null-marker cell. The raw
//! table is only read.

pub mod mapping;
pub mod sources;

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use cm_common::{CarrierId, Error, Result, SnapshotVersion, SourceKind, Stage, StageContext, Value};
use cm_tables::RawTable;

pub use mapping::{Cardinality, ColumnKind, ColumnSpec, SchemaMapping};

/// Raw strings that mean "no value".
const NULL_MARKERS: &[&str] = &["na", "n/a", "none", "null", "nan"];

/// Accepted date layouts, most common first.
const DATE_FORMATS: &[&str] = &["%d-%b-%y", "%Y-%m-%d", "%d-%b-%Y", "%m/%d/%Y", "%Y%m%d"];

/// One normalized row.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    /// `None` only for sources whose key is nullable.
    pub key: Option<CarrierId>,
    pub values: Vec<Value>,
}

/// A typed, canonical per-source table.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    pub source: SourceKind,
    pub columns: Vec<String>,
    pub rows: Vec<CanonicalRow>,
    /// Non-null raw cells that failed to parse as their column type.
    pub parse_failures: usize,
}

impl CanonicalTable {
    pub fn empty(source: SourceKind, mapping: &SchemaMapping) -> Self {
        CanonicalTable {
            source,
            columns: mapping.columns.iter().map(|c| c.name.clone()).collect(),
            rows: Vec::new(),
            parse_failures: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell accessor; unknown columns read as null.
    pub fn value<'a>(&'a self, row: &'a CanonicalRow, name: &str) -> &'a Value {
        static NULL: Value = Value::Null;
        self.column(name)
            .and_then(|idx| row.values.get(idx))
            .unwrap_or(&NULL)
    }
}

/// True for cells that carry no value.
pub fn is_null_marker(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m))
}

/// Normalize one raw table under `mapping`.
pub fn normalize(
    raw: &RawTable,
    mapping: &SchemaMapping,
    snapshot: &SnapshotVersion,
) -> Result<CanonicalTable> {
    let context = || StageContext::new(Stage::Normalize, mapping.source.as_str()).with_snapshot(snapshot);

    let locate = |spec: &ColumnSpec| spec.candidates().find_map(|name| raw.column_index(name));
    let mut missing = Vec::new();
    let key_idx = locate(&mapping.key);
    if key_idx.is_none() {
        missing.push(mapping.key.name.clone());
    }
    let column_idx: Vec<Option<usize>> = mapping
        .columns
        .iter()
        .map(|spec| {
            let idx = locate(spec);
            if idx.is_none() && spec.required {
                missing.push(spec.name.clone());
            }
            idx
        })
        .collect();
    let key_idx = match key_idx {
        Some(idx) if missing.is_empty() => idx,
        _ => {
            return Err(Error::SchemaMismatch {
                context: context(),
                missing,
            })
        }
    };

    let mut table = CanonicalTable::empty(mapping.source, mapping);
    let mut seen: HashMap<CarrierId, usize> = HashMap::new();

    for (row_no, raw_row) in raw.rows.iter().enumerate() {
        if raw_row.iter().all(|c| c.as_deref().map_or(true, is_null_marker)) {
            continue;
        }
        let key_cell = raw_row.get(key_idx).and_then(|c| c.as_deref());
        let key = key_cell.filter(|c| !is_null_marker(c)).and_then(CarrierId::parse);
        if key.is_none() && !mapping.key_nullable {
            return Err(Error::KeyViolation {
                context: context(),
                detail: format!(
                    "row {}: invalid carrier id {:?}",
                    row_no + 1,
                    key_cell.unwrap_or("")
                ),
            });
        }

        let mut values = Vec::with_capacity(mapping.columns.len());
        for (spec, idx) in mapping.columns.iter().zip(&column_idx) {
            let cell = idx.and_then(|i| raw_row.get(i)).and_then(|c| c.as_deref());
            let (value, failed) = parse_cell(cell, spec.kind);
            if failed {
                table.parse_failures += 1;
                debug!(
                    source = mapping.source.as_str(),
                    column = spec.name.as_str(),
                    row = row_no + 1,
                    "unparseable cell treated as null"
                );
            }
            values.push(value);
        }

        let row = CanonicalRow { key, values };
        match (mapping.cardinality, key) {
            (Cardinality::Many, _) | (_, None) => table.rows.push(row),
            (cardinality, Some(id)) => match seen.get(&id) {
                None => {
                    seen.insert(id, table.rows.len());
                    table.rows.push(row);
                }
                Some(&existing) if cardinality == Cardinality::LastWins => {
                    table.rows[existing] = row;
                }
                Some(_) => {
                    return Err(Error::KeyViolation {
                        context: context(),
                        detail: format!("duplicate carrier id {id}"),
                    })
                }
            },
        }
    }

    if table.parse_failures > 0 {
        warn!(
            source = mapping.source.as_str(),
            cells = table.parse_failures,
            "unparseable cells normalized to null"
        );
    }
    debug!(source = mapping.source.as_str(), rows = table.len(), "source normalized");
    Ok(table)
}

/// Parse one cell. Returns the value and whether a non-null cell failed to parse.
fn parse_cell(cell: Option<&str>, kind: ColumnKind) -> (Value, bool) {
    let Some(raw) = cell.filter(|c| !is_null_marker(c)) else {
        return (Value::Null, false);
    };
    let raw = raw.trim();
    let parsed = match kind {
        ColumnKind::Text => Some(Value::Text(raw.to_string())),
        ColumnKind::Upper => Some(Value::Text(raw.to_ascii_uppercase())),
        ColumnKind::Int => parse_int(raw).map(Value::Int),
        ColumnKind::IntZeroNull => match parse_int(raw) {
            Some(0) => return (Value::Null, false),
            other => other.map(Value::Int),
        },
        ColumnKind::Float => parse_float(raw).map(Value::Float),
        ColumnKind::Date => parse_date(raw).map(Value::Date),
        ColumnKind::Flag => parse_flag(raw).map(Value::Bool),
        ColumnKind::Operation => Some(Value::Text(decode_operation(raw))),
    };
    match parsed {
        Some(value) => (value, false),
        None => (Value::Null, true),
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    // Integer columns exported through float-typed tools ("12.0").
    let f = cleaned.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn parse_float(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '$')).collect();
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parse a date in any accepted layout. Two-digit years follow chrono's
/// `%y` pivot (69-99 → 19xx, 00-68 → 20xx).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps: keep the date part.
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "t" | "1" => Some(true),
        "n" | "no" | "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Census operation codes to their descriptions. Unknown codes pass through.
fn decode_operation(raw: &str) -> String {
    match raw.to_ascii_uppercase().as_str() {
        "A" => "Interstate".to_string(),
        "B" => "Intrastate Hazmat".to_string(),
        "C" => "Intrastate Non-Hazmat".to_string(),
        _ => raw.to_string(),
    }
}

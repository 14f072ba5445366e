//! String-celled raw tables as read from source files.
//!
//! Cells keep their original text; typing and null handling belong to the
//! source normalizer. A cell is `None` only when the file format itself marks
//! it missing (Parquet nulls, empty CSV fields).

/// A raw table with named columns and row-major cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        RawTable {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from string literals. Every cell is present.
    pub fn from_rows(name: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        RawTable {
            name: name.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| Some((*c).to_string())).collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Append the rows of `other`, aligning columns by name.
    ///
    /// Columns only `other` has are added; rows missing a column get `None`.
    pub fn append(&mut self, other: RawTable) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|col| match self.column_index(col) {
                Some(idx) => idx,
                None => {
                    self.columns.push(col.clone());
                    for row in &mut self.rows {
                        row.push(None);
                    }
                    self.columns.len() - 1
                }
            })
            .collect();
        let width = self.columns.len();
        for row in other.rows {
            let mut aligned = vec![None; width];
            for (cell, &idx) in row.into_iter().zip(&mapping) {
                aligned[idx] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

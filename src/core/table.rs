//! Row Store: CSV job tables persisted after every mutation.
//!
//! The table file is the only checkpoint. Saves go through a temp file in the
//! same directory and an atomic rename, so a reader never sees a partially
//! written table.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::domain::{ColumnLayout, Grade, Row};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Row Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table {} is missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("table {} has no header row", path.display())]
    NoHeader { path: PathBuf },

    #[error("table {} is malformed at record {record}: {detail}", path.display())]
    Malformed {
        path: PathBuf,
        record: usize,
        detail: String,
    },

    #[error("I/O error on table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on table {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// In-memory job table: ordered header plus ordered records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    records: Vec<Vec<String>>,
    /// Whether the file carries a UTF-8 byte-order mark
    bom: bool,
}

impl Table {
    /// Create an empty table. New tables are written with a byte-order mark.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
            bom: true,
        }
    }

    /// Load a table from disk
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &bytes)
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<Self, StoreError> {
        let (bom, body) = match bytes.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, bytes),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);

        let csv_err = |source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();

        if columns.is_empty() || columns.iter().all(|c| c.trim().is_empty()) {
            return Err(StoreError::NoHeader {
                path: path.to_path_buf(),
            });
        }

        let mut records = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            if record.len() > columns.len() {
                return Err(StoreError::Malformed {
                    path: path.to_path_buf(),
                    record: idx + 1,
                    detail: format!(
                        "expected at most {} fields, found {}",
                        columns.len(),
                        record.len()
                    ),
                });
            }

            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(columns.len(), String::new());
            records.push(cells);
        }

        Ok(Self {
            columns,
            records,
            bom,
        })
    }

    /// Persist the complete table, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        if self.bom {
            tmp.write_all(BOM).map_err(io_err)?;
        }

        {
            let csv_err = |source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            };
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(&self.columns).map_err(csv_err)?;
            for record in &self.records {
                writer.write_record(record).map_err(csv_err)?;
            }
            writer.flush().map_err(io_err)?;
        }

        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!(path = %path.display(), rows = self.records.len(), "Table saved");
        Ok(())
    }

    /// Seed a job table from a question-source export.
    ///
    /// The first source column becomes the original text, the second (when
    /// present and non-empty) the input text. Records without original text
    /// are dropped.
    pub fn seed_from(source: &Table, layout: &ColumnLayout) -> Self {
        let mut table = Self::new(vec![layout.original.clone(), layout.input.clone()]);

        for record in &source.records {
            let original = record.first().map(String::as_str).unwrap_or_default();
            if original.trim().is_empty() {
                continue;
            }
            let input = record
                .get(1)
                .map(String::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(original);

            table.records.push(vec![original.to_string(), input.to_string()]);
        }

        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Fail with a schema error if any column is structurally absent
    pub fn require_columns(&self, path: &Path, names: &[&str]) -> Result<(), StoreError> {
        match names.iter().find(|name| !self.has_column(name)) {
            Some(missing) => Err(StoreError::MissingColumn {
                path: path.to_path_buf(),
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Append a column if absent. Returns true when the header changed.
    pub fn ensure_column(&mut self, name: &str) -> bool {
        if self.has_column(name) {
            return false;
        }

        self.columns.push(name.to_string());
        for record in &mut self.records {
            record.push(String::new());
        }
        true
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.records.get(row)?.get(idx).map(String::as_str)
    }

    /// Overwrite one cell, appending the column first if needed
    pub fn set_cell(&mut self, row: usize, column: &str, value: impl Into<String>) {
        self.ensure_column(column);
        if let (Some(idx), Some(record)) = (self.column_index(column), self.records.get_mut(row)) {
            record[idx] = value.into();
        }
    }

    /// Append a raw record, padded or truncated to the header width
    pub fn push_record(&mut self, mut cells: Vec<String>) {
        cells.resize(self.columns.len(), String::new());
        self.records.push(cells);
    }

    /// Typed view of one row
    pub fn row(&self, index: usize, layout: &ColumnLayout) -> Option<Row> {
        if index >= self.records.len() {
            return None;
        }

        let text = |name: &str| self.cell(index, name).unwrap_or_default();
        let present = |name: &str| {
            Some(text(name))
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
        };

        let original_text = text(&layout.original).to_string();
        let input_text = present(&layout.input).unwrap_or_else(|| original_text.clone());

        Some(Row {
            original_text,
            input_text,
            generated_text: present(&layout.generated),
            normalized_text: present(&layout.normalized),
            grade: Grade::parse(text(&layout.grade)),
            justification: text(&layout.justification).trim().to_string(),
        })
    }

    /// Typed views of all rows, in order
    pub fn rows(&self, layout: &ColumnLayout) -> Vec<Row> {
        (0..self.records.len())
            .filter_map(|idx| self.row(idx, layout))
            .collect()
    }
}

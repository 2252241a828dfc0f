//! Running batch summary, persisted after every job.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::Job;
use super::row::{ColumnLayout, Grade};
use crate::core::table::{StoreError, Table};

const COLUMNS: [&str; 11] = [
    "filename",
    "section",
    "language",
    "total_rows",
    "evaluated_rows",
    "error_rows",
    "pending_rows",
    "average_grade",
    "has_errors",
    "error",
    "updated_at",
];

/// Per-table statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    /// Job table file name; the summary key
    pub filename: String,
    pub section: String,
    pub language: String,
    pub total_rows: usize,
    /// Rows holding a recorded grade
    pub evaluated_rows: usize,
    /// Rows holding the sentinel grade
    pub error_rows: usize,
    /// Rows never graded
    pub pending_rows: usize,
    /// Mean over recorded grades only, rounded to two decimals
    pub average_grade: Option<f64>,
    pub has_errors: bool,
    /// Job-level failure, if the job ended early
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobSummary {
    /// Compute statistics from a job table
    pub fn from_table(job: &Job, table: &Table, layout: &ColumnLayout) -> Self {
        let grades: Vec<Grade> = table.rows(layout).iter().map(|row| row.grade).collect();

        let scored: Vec<f64> = grades.iter().filter_map(Grade::value).collect();
        let error_rows = grades.iter().filter(|g| g.is_failed()).count();
        let pending_rows = grades.len() - scored.len() - error_rows;

        Self {
            filename: job.table_name(),
            section: job.section.clone(),
            language: job.language.clone(),
            total_rows: grades.len(),
            evaluated_rows: scored.len(),
            error_rows,
            pending_rows,
            average_grade: mean(&scored),
            has_errors: error_rows > 0,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Entry for a job that failed before statistics could be computed
    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            filename: job.table_name(),
            section: job.section.clone(),
            language: job.language.clone(),
            total_rows: 0,
            evaluated_rows: 0,
            error_rows: 0,
            pending_rows: 0,
            average_grade: None,
            has_errors: true,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }

    /// Attach a job-level error to computed statistics
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.has_errors = true;
        self
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.filename.clone(),
            self.section.clone(),
            self.language.clone(),
            self.total_rows.to_string(),
            self.evaluated_rows.to_string(),
            self.error_rows.to_string(),
            self.pending_rows.to_string(),
            self.average_grade.map(|g| g.to_string()).unwrap_or_default(),
            self.has_errors.to_string(),
            self.error.clone().unwrap_or_default(),
            self.updated_at.to_rfc3339(),
        ]
    }

    fn from_cells(table: &Table, row: usize) -> Option<Self> {
        let cell = |name: &str| table.cell(row, name).unwrap_or_default();
        let count = |name: &str| cell(name).trim().parse::<usize>().unwrap_or(0);

        let filename = cell("filename").to_string();
        if filename.is_empty() {
            return None;
        }

        Some(Self {
            filename,
            section: cell("section").to_string(),
            language: cell("language").to_string(),
            total_rows: count("total_rows"),
            evaluated_rows: count("evaluated_rows"),
            error_rows: count("error_rows"),
            pending_rows: count("pending_rows"),
            average_grade: cell("average_grade").trim().parse().ok(),
            has_errors: cell("has_errors").trim().eq_ignore_ascii_case("true"),
            error: Some(cell("error").to_string()).filter(|e| !e.is_empty()),
            updated_at: DateTime::parse_from_rfc3339(cell("updated_at").trim())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    Some((avg * 100.0).round() / 100.0)
}

/// All job summaries of a batch, keyed by table file name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub entries: Vec<JobSummary>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a persisted summary; a missing file is an empty summary
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let table = Table::load(path)?;
        let entries = (0..table.len())
            .filter_map(|row| JobSummary::from_cells(&table, row))
            .collect();

        Ok(Self { entries })
    }

    /// Persist atomically, like a job table
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut table = Table::new(COLUMNS.iter().map(|c| c.to_string()).collect());
        for entry in &self.entries {
            table.push_record(entry.to_record());
        }
        table.save(path)
    }

    /// Insert or replace the entry for a table
    pub fn upsert(&mut self, entry: JobSummary) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.filename == entry.filename)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn get(&self, filename: &str) -> Option<&JobSummary> {
        self.entries.iter().find(|e| e.filename == filename)
    }
}

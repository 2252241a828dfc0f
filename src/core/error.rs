//! Per-job failure taxonomy.
//!
//! Row-level oracle failures never surface here: they are recorded in the
//! table. A `JobError` ends the current job only.

use std::path::PathBuf;

use thiserror::Error;

use super::table::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    /// The job table could not be loaded, validated or persisted
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Section has no rubric mapping
    #[error("unknown section '{section}' (known sections: {known})")]
    UnknownSection { section: String, known: String },

    /// Rubric resource could not be read
    #[error("failed to read rubric {}: {source}", path.display())]
    Rubric {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Grading was requested without a rubric
    #[error("no rubric loaded for section '{section}'")]
    NoRubric { section: String },

    /// A targeted redo named a row the table does not have (1-based)
    #[error("row {row} is out of range (table has {rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },

    /// Neither the job table nor a question source to seed it exists
    #[error("no job table at {} and no question source at {}", table.display(), input.display())]
    MissingInput { table: PathBuf, input: PathBuf },
}

impl JobError {
    /// Schema errors: structurally missing columns or unresolvable rubrics
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::MissingColumn { .. })
                | Self::Store(StoreError::NoHeader { .. })
                | Self::UnknownSection { .. }
        )
    }
}

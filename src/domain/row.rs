//! Row state for a job table.
//!
//! A row is identified by its position in the table. Its typed view is
//! derived from the raw cells on every read, so the table stays the single
//! source of truth for progress.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Grade cell value that marks an attempted-but-failed evaluation
pub const SENTINEL_GRADE: &str = "-1";

/// Typed view of one table row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Source-of-truth content, never overwritten
    pub original_text: String,

    /// Text sent to the generation oracle (localized variant or the original)
    pub input_text: String,

    /// Generation oracle output
    pub generated_text: Option<String>,

    /// Generated text translated into the evaluation language
    pub normalized_text: Option<String>,

    /// Grading state
    pub grade: Grade,

    /// Grader justification, or the failure cause for a failed grade
    pub justification: String,
}

/// Grading state of a row
///
/// The table stores `Pending` as an empty cell and `Failed` as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Grade {
    /// Never graded
    #[default]
    Pending,

    /// Grading was attempted and failed
    Failed,

    /// A grade was recorded
    Scored(f64),
}

impl Grade {
    /// Parse a grade cell.
    ///
    /// Anything that is neither empty, the sentinel, nor a number is treated
    /// as pending so that the row gets graded again.
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Self::Pending;
        }

        match cell.parse::<f64>() {
            Ok(value) if value == -1.0 => Self::Failed,
            Ok(value) if value.is_finite() => Self::Scored(value),
            _ => Self::Pending,
        }
    }

    /// Cell representation of this grade
    pub fn to_cell(&self) -> String {
        match self {
            Self::Pending => String::new(),
            Self::Failed => SENTINEL_GRADE.to_string(),
            Self::Scored(value) => value.to_string(),
        }
    }

    /// Numeric value, if scored
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Scored(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Failed => write!(f, "{}", SENTINEL_GRADE),
            Self::Scored(value) => write!(f, "{}", value),
        }
    }
}

/// Header names that carry each row attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    #[serde(default = "default_original")]
    pub original: String,

    #[serde(default = "default_input")]
    pub input: String,

    #[serde(default = "default_generated")]
    pub generated: String,

    #[serde(default = "default_normalized")]
    pub normalized: String,

    #[serde(default = "default_grade")]
    pub grade: String,

    #[serde(default = "default_justification")]
    pub justification: String,
}

fn default_original() -> String {
    "Original Question".to_string()
}
fn default_input() -> String {
    "Question Sent to Model".to_string()
}
fn default_generated() -> String {
    "Model Response".to_string()
}
fn default_normalized() -> String {
    "English Translation".to_string()
}
fn default_grade() -> String {
    "Grade".to_string()
}
fn default_justification() -> String {
    "Justification".to_string()
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            original: default_original(),
            input: default_input(),
            generated: default_generated(),
            normalized: default_normalized(),
            grade: default_grade(),
            justification: default_justification(),
        }
    }
}

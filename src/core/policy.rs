//! Stage Policy: decides from field content alone whether a row still needs
//! a stage.
//!
//! The predicate is pure, so a fresh process re-derives exactly the same
//! remaining work from the table with no separate progress log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{ColumnLayout, Row};

/// Prefix written into the generated-text field when generation fails
pub const GENERATION_ERROR_MARKER: &str = "[GENERATION_ERROR:";

/// Prefix written into the normalized-text field when translation fails
pub const TRANSLATION_ERROR_MARKER: &str = "[TRANSLATION_ERROR:";

/// Reserved prefixes that mark a text field as a recorded failure.
///
/// Includes the markers written by earlier tooling so their tables resume
/// correctly.
pub const ERROR_MARKERS: &[&str] = &[
    GENERATION_ERROR_MARKER,
    TRANSLATION_ERROR_MARKER,
    "[OPENAI_API_ERROR:",
    "[CLAUDE_API_ERROR:",
    "[GENERIC_ERROR:",
    "[UNKNOWN_ERROR:",
    "[PROCESSING_ERROR:",
    "[Translation Error:",
    "ERROR:",
    "TRANSLATION_ERROR:",
];

/// One transformation applied uniformly to all rows of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Produce a model answer from the input text
    Generate,

    /// Translate the answer into the evaluation language
    Translate,

    /// Score the answer against the section rubric
    Grade,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Generate, Stage::Translate, Stage::Grade];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Translate => "translate",
            Self::Grade => "grade",
        }
    }

    /// Columns the stage reads; their absence is a schema error
    pub fn required_columns<'a>(&self, layout: &'a ColumnLayout) -> Vec<&'a str> {
        match self {
            Self::Generate => vec![layout.original.as_str()],
            Self::Translate => vec![layout.original.as_str(), layout.generated.as_str()],
            Self::Grade => vec![layout.original.as_str(), layout.normalized.as_str()],
        }
    }

    /// Columns the stage writes; appended to the table when absent
    pub fn output_columns<'a>(&self, layout: &'a ColumnLayout) -> Vec<&'a str> {
        match self {
            Self::Generate => vec![layout.input.as_str(), layout.generated.as_str()],
            Self::Translate => vec![layout.normalized.as_str()],
            Self::Grade => vec![layout.grade.as_str(), layout.justification.as_str()],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generate" => Ok(Self::Generate),
            "translate" => Ok(Self::Translate),
            "grade" => Ok(Self::Grade),
            other => Err(format!(
                "unknown stage '{}' (expected generate, translate or grade)",
                other
            )),
        }
    }
}

/// True if the text starts with a reserved error marker
pub fn is_error_marker(text: &str) -> bool {
    let text = text.trim_start();
    ERROR_MARKERS.iter().any(|marker| text.starts_with(marker))
}

/// True if a text field holds a usable stage output
pub fn is_text_done(text: Option<&str>) -> bool {
    match text {
        Some(text) => !text.trim().is_empty() && !is_error_marker(text),
        None => false,
    }
}

/// Whether `stage` already holds a valid output for `row`
pub fn is_done(row: &Row, stage: Stage) -> bool {
    match stage {
        Stage::Generate => is_text_done(row.generated_text.as_deref()),
        Stage::Translate => is_text_done(row.normalized_text.as_deref()),
        Stage::Grade => row.grade.value().is_some() && !row.justification.trim().is_empty(),
    }
}

/// Whether the input a stage consumes is ready
pub fn is_upstream_ready(row: &Row, stage: Stage) -> bool {
    match stage {
        Stage::Generate => !row.input_text.trim().is_empty(),
        Stage::Translate => is_done(row, Stage::Generate),
        Stage::Grade => is_done(row, Stage::Translate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Grade;

    fn row() -> Row {
        Row {
            original_text: "q".to_string(),
            input_text: "q".to_string(),
            generated_text: None,
            normalized_text: None,
            grade: Grade::Pending,
            justification: String::new(),
        }
    }

    #[test]
    fn test_grade_done_requires_grade_and_justification() {
        let mut r = row();
        assert!(!is_done(&r, Stage::Grade));

        r.grade = Grade::Scored(5.0);
        assert!(!is_done(&r, Stage::Grade));

        r.justification = "polite".to_string();
        assert!(is_done(&r, Stage::Grade));

        r.grade = Grade::Failed;
        assert!(!is_done(&r, Stage::Grade));
    }

    #[test]
    fn test_text_stages_exclude_error_markers() {
        let mut r = row();
        r.generated_text = Some("[GENERATION_ERROR: timeout]".to_string());
        assert!(!is_done(&r, Stage::Generate));

        r.generated_text = Some("[OPENAI_API_ERROR: 500]".to_string());
        assert!(!is_done(&r, Stage::Generate));

        r.generated_text = Some("   ".to_string());
        assert!(!is_done(&r, Stage::Generate));

        r.generated_text = Some("A fine answer".to_string());
        assert!(is_done(&r, Stage::Generate));

        r.normalized_text = Some("[Translation Error: quota]".to_string());
        assert!(!is_done(&r, Stage::Translate));
    }

    #[test]
    fn test_upstream_readiness() {
        let mut r = row();
        assert!(is_upstream_ready(&r, Stage::Generate));
        assert!(!is_upstream_ready(&r, Stage::Translate));

        r.generated_text = Some("answer".to_string());
        r.normalized_text = Some("answer".to_string());
        assert!(is_upstream_ready(&r, Stage::Grade));
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("Grade".parse::<Stage>().unwrap(), Stage::Grade);
        assert!("score".parse::<Stage>().is_err());
    }
}

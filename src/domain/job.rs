//! Jobs: one (section, language) unit of batch work.
//!
//! A job is resolved once from the work list and never changes afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::JobError;

/// One unit of batch work bound to one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Section key (e.g. `Harm_Prev`)
    pub section: String,

    /// Response language display name (e.g. `Arabic`)
    pub language: String,

    /// Question-source export the table is seeded from
    pub input_path: PathBuf,

    /// Job table, mutated in place stage by stage
    pub table_path: PathBuf,

    /// Rubric resource for the section
    pub rubric_path: PathBuf,
}

impl Job {
    /// Short label used in logs
    pub fn label(&self) -> String {
        format!("{}-{}", self.language, self.section)
    }

    /// File name of the job table
    pub fn table_name(&self) -> String {
        self.table_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.label())
    }
}

/// Resolves jobs from section/language pairs
#[derive(Debug, Clone)]
pub struct JobLayout {
    /// Directory holding question-source exports
    pub questions_dir: PathBuf,

    /// Directory holding job tables
    pub output_dir: PathBuf,

    /// Directory holding rubric resources
    pub rubrics_dir: PathBuf,

    /// Section key -> question-source subdirectory
    pub sections: BTreeMap<String, String>,

    /// Section key -> rubric file name
    pub rubrics: BTreeMap<String, String>,

    /// Input file pattern relative to `questions_dir`
    pub input_pattern: String,

    /// Table file pattern relative to `output_dir`
    pub output_pattern: String,
}

impl JobLayout {
    /// Resolve a job. Unknown sections fail closed.
    pub fn resolve(&self, section: &str, language: &str) -> Result<Job, JobError> {
        let rubric_file = self.rubric_file(section)?;
        let section_dir = self
            .sections
            .get(section)
            .map(String::as_str)
            .unwrap_or(section);

        let input = expand(&self.input_pattern, section, section_dir, language);
        let output = expand(&self.output_pattern, section, section_dir, language);

        Ok(Job {
            section: section.to_string(),
            language: language.to_string(),
            input_path: self.questions_dir.join(input),
            table_path: self.output_dir.join(output),
            rubric_path: self.rubrics_dir.join(rubric_file),
        })
    }

    /// Look up the rubric file for a section
    pub fn rubric_file(&self, section: &str) -> Result<&str, JobError> {
        self.rubrics
            .get(section)
            .map(String::as_str)
            .ok_or_else(|| JobError::UnknownSection {
                section: section.to_string(),
                known: self.rubrics.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }
}

fn expand(pattern: &str, section: &str, section_dir: &str, language: &str) -> String {
    pattern
        .replace("{section_dir}", section_dir)
        .replace("{section}", section)
        .replace("{language}", language)
}

/// Rubric text passed unmodified into every grading call of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    pub text: String,
}

impl Rubric {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Load a rubric resource.
    ///
    /// A `.csv` rubric whose first record has description, 1-point, 3-point
    /// and 5-point criteria is rendered as a grading scale. Anything else is
    /// used verbatim.
    pub fn load(path: &Path) -> Result<Self, JobError> {
        let raw = std::fs::read_to_string(path).map_err(|source| JobError::Rubric {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = raw.trim_start_matches('\u{feff}');

        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        if is_csv {
            if let Some(text) = render_scale(raw) {
                return Ok(Self::new(text));
            }
        }

        Ok(Self::new(raw))
    }
}

fn render_scale(raw: &str) -> Option<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());
    let record = reader.records().next()?.ok()?;
    if record.len() < 4 {
        return None;
    }

    Some(format!(
        "Rubric:\n\
         Description and Examples: {}\n\
         Grading Scale:\n\
         1 point: {}\n\
         3 points: {}\n\
         5 points: {}\n",
        record[0].trim(),
        record[1].trim(),
        record[2].trim(),
        record[3].trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> JobLayout {
        JobLayout {
            questions_dir: PathBuf::from("q"),
            output_dir: PathBuf::from("out"),
            rubrics_dir: PathBuf::from("rubrics"),
            sections: [("Harm_Prev".to_string(), "harm_prev".to_string())]
                .into_iter()
                .collect(),
            rubrics: [("Harm_Prev".to_string(), "Safety-Rubric.csv".to_string())]
                .into_iter()
                .collect(),
            input_pattern: "{section_dir}/{language}-{section}.csv".to_string(),
            output_pattern: "{language}-{section}-Evals.csv".to_string(),
        }
    }

    #[test]
    fn test_resolve_paths() {
        let job = layout().resolve("Harm_Prev", "Hindi").unwrap();

        assert_eq!(job.input_path, PathBuf::from("q/harm_prev/Hindi-Harm_Prev.csv"));
        assert_eq!(job.table_path, PathBuf::from("out/Hindi-Harm_Prev-Evals.csv"));
        assert_eq!(job.rubric_path, PathBuf::from("rubrics/Safety-Rubric.csv"));
        assert_eq!(job.table_name(), "Hindi-Harm_Prev-Evals.csv");
    }

    #[test]
    fn test_unknown_section_fails_closed() {
        let err = layout().resolve("Astrology", "Hindi").unwrap_err();
        assert!(matches!(err, JobError::UnknownSection { .. }));
        assert!(err.to_string().contains("Harm_Prev"));
    }

    #[test]
    fn test_tabular_rubric_rendering() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Safety-Rubric.csv");
        std::fs::write(
            &path,
            "\u{feff}Description,1,3,5\n\"Avoids harm, explains\",harmful,partial,safe\n",
        )
        .unwrap();

        let rubric = Rubric::load(&path).unwrap();
        assert!(rubric.text.contains("Description and Examples: Avoids harm, explains"));
        assert!(rubric.text.contains("5 points: safe"));
    }

    #[test]
    fn test_text_rubric_verbatim() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("politeness.txt");
        std::fs::write(&path, "score 1/3/5 on politeness").unwrap();

        let rubric = Rubric::load(&path).unwrap();
        assert_eq!(rubric.text, "score 1/3/5 on politeness");
    }

    #[test]
    fn test_missing_rubric_file() {
        let err = Rubric::load(Path::new("/nonexistent/rubric.csv")).unwrap_err();
        assert!(matches!(err, JobError::Rubric { .. }));
    }
}

//! Stage Runner: applies one stage to every not-yet-done row of a table.
//!
//! Each row is checkpointed to disk before the next one starts. Within a run
//! an oracle failure is terminal for its row; the failure state written to
//! the table is not "done", so the next run picks the row up again.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ColumnLayout, Grade, Job, Row, Rubric};
use crate::oracle::{Evaluation, OracleClient, OracleRequest, OracleResult, Payload};

use super::error::JobError;
use super::policy::{self, Stage, GENERATION_ERROR_MARKER, TRANSLATION_ERROR_MARKER};
use super::table::Table;

/// Job-level inputs shared by every row of a stage
#[derive(Debug, Clone)]
pub struct StageContext<'a> {
    pub job: &'a Job,

    /// Required by the grading stage
    pub rubric: Option<&'a Rubric>,

    /// Language answers are normalized into for grading
    pub evaluation_language: &'a str,
}

impl StageContext<'_> {
    /// Whether the job's answers are already in the evaluation language
    pub fn is_canonical_language(&self) -> bool {
        self.job
            .language
            .trim()
            .eq_ignore_ascii_case(self.evaluation_language.trim())
    }
}

/// Counters for one stage over one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub total: usize,
    /// Rows already done
    pub skipped: usize,
    pub succeeded: usize,
    /// Rows whose oracle call failed after all retries
    pub failed: usize,
    /// Rows whose upstream output was missing
    pub blocked: usize,
    /// Logical oracle calls made (retries not counted)
    pub oracle_calls: usize,
}

/// Result of processing one row
#[derive(Debug, Clone, PartialEq)]
enum RowOutcome {
    Text(String),
    Graded(Evaluation),
    Failed { cause: String, attempts: u32 },
    Blocked(String),
}

/// Runs a single stage through one oracle
pub struct StageRunner {
    stage: Stage,
    client: OracleClient,
    layout: ColumnLayout,
    row_delay: Duration,
}

impl StageRunner {
    pub fn new(stage: Stage, client: OracleClient, layout: ColumnLayout, row_delay: Duration) -> Self {
        Self {
            stage,
            client,
            layout,
            row_delay,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Process every row that is not done, saving the table after each one.
    ///
    /// Only Row Store failures and a missing rubric surface as errors; oracle
    /// failures are recorded in the table.
    #[instrument(skip_all, fields(stage = %self.stage, job = %ctx.job.label()))]
    pub async fn run(
        &self,
        ctx: &StageContext<'_>,
        table: &mut Table,
        path: &Path,
    ) -> Result<StageReport, JobError> {
        table.require_columns(path, &self.stage.required_columns(&self.layout))?;

        if self.stage == Stage::Grade && ctx.rubric.is_none() {
            return Err(JobError::NoRubric {
                section: ctx.job.section.clone(),
            });
        }

        let mut added = false;
        for column in self.stage.output_columns(&self.layout) {
            added |= table.ensure_column(column);
        }
        if added {
            table.save(path)?;
        }

        let mut report = StageReport {
            total: table.len(),
            ..Default::default()
        };

        for idx in 0..table.len() {
            let Some(row) = table.row(idx, &self.layout) else {
                continue;
            };

            if policy::is_done(&row, self.stage) {
                debug!(row = idx + 1, "Already done, skipping");
                report.skipped += 1;
                continue;
            }

            let outcome = self.process(ctx, &row, &mut report).await;

            match &outcome {
                RowOutcome::Text(_) | RowOutcome::Graded(_) => {
                    report.succeeded += 1;
                    info!(row = idx + 1, total = report.total, "Row completed");
                }
                RowOutcome::Failed { cause, attempts } => {
                    report.failed += 1;
                    warn!(row = idx + 1, attempts, %cause, "Row failed");
                }
                RowOutcome::Blocked(reason) => {
                    report.blocked += 1;
                    warn!(row = idx + 1, %reason, "Row blocked on upstream stage");
                }
            }

            self.apply(table, idx, &row, outcome);
            table.save(path)?;
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            blocked = report.blocked,
            skipped = report.skipped,
            "Stage finished"
        );

        Ok(report)
    }

    async fn process(
        &self,
        ctx: &StageContext<'_>,
        row: &Row,
        report: &mut StageReport,
    ) -> RowOutcome {
        if !policy::is_upstream_ready(row, self.stage) {
            return RowOutcome::Blocked(self.blocked_reason().to_string());
        }

        let request = match self.stage {
            Stage::Generate => OracleRequest::Generate {
                prompt: row.input_text.clone(),
                language: ctx.job.language.clone(),
            },
            Stage::Translate => {
                let text = row.generated_text.clone().unwrap_or_default();
                if ctx.is_canonical_language() {
                    return RowOutcome::Text(text);
                }
                OracleRequest::Translate {
                    text,
                    source_language: ctx.job.language.clone(),
                    target_language: ctx.evaluation_language.to_string(),
                }
            }
            Stage::Grade => OracleRequest::Grade {
                question: row.original_text.clone(),
                answer: row.normalized_text.clone().unwrap_or_default(),
                rubric: ctx.rubric.map(|r| r.text.clone()).unwrap_or_default(),
            },
        };

        // Rate-limit courtesy between consecutive oracle calls
        if report.oracle_calls > 0 && !self.row_delay.is_zero() {
            tokio::time::sleep(self.row_delay).await;
        }
        report.oracle_calls += 1;

        match self.client.call(&request).await {
            OracleResult::Success(Payload::Text(text)) => RowOutcome::Text(text),
            OracleResult::Success(Payload::Evaluation(evaluation)) => RowOutcome::Graded(evaluation),
            OracleResult::Failure { cause, attempts } => RowOutcome::Failed { cause, attempts },
        }
    }

    fn blocked_reason(&self) -> &'static str {
        match self.stage {
            Stage::Generate => "no input text to send",
            Stage::Translate => "no generated response to translate",
            Stage::Grade => "No response to evaluate",
        }
    }

    fn apply(&self, table: &mut Table, idx: usize, row: &Row, outcome: RowOutcome) {
        let layout = &self.layout;

        match self.stage {
            Stage::Generate => {
                if table.cell(idx, &layout.input).map_or(true, |c| c.trim().is_empty()) {
                    table.set_cell(idx, &layout.input, row.input_text.clone());
                }
                let text = match outcome {
                    RowOutcome::Text(text) => text,
                    RowOutcome::Failed { cause, .. } | RowOutcome::Blocked(cause) => {
                        format!("{} {}]", GENERATION_ERROR_MARKER, cause)
                    }
                    RowOutcome::Graded(_) => return,
                };
                table.set_cell(idx, &layout.generated, text);
            }
            Stage::Translate => {
                let text = match outcome {
                    RowOutcome::Text(text) => text,
                    RowOutcome::Failed { cause, .. } | RowOutcome::Blocked(cause) => {
                        format!("{} {}]", TRANSLATION_ERROR_MARKER, cause)
                    }
                    RowOutcome::Graded(_) => return,
                };
                table.set_cell(idx, &layout.normalized, text);
            }
            Stage::Grade => {
                let (grade, justification) = match outcome {
                    RowOutcome::Graded(evaluation) => {
                        (Grade::Scored(evaluation.grade), evaluation.justification)
                    }
                    RowOutcome::Failed { cause, attempts } => (
                        Grade::Failed,
                        format!("Evaluation failed after {} attempts: {}", attempts, cause),
                    ),
                    RowOutcome::Blocked(reason) => (Grade::Failed, reason),
                    RowOutcome::Text(_) => return,
                };
                table.set_cell(idx, &layout.grade, grade.to_cell());
                table.set_cell(idx, &layout.justification, justification);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetryPolicy;
    use crate::oracle::Oracle;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Echoes the request back, or fails when the text contains "fail"
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Oracle for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, request: &OracleRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = match request {
                OracleRequest::Generate { prompt, .. } => prompt.clone(),
                OracleRequest::Translate { text, .. } => format!("EN:{}", text),
                OracleRequest::Grade { .. } => r#"{"grade": 3, "justification": "ok"}"#.to_string(),
            };
            if text.contains("fail") {
                anyhow::bail!("refused");
            }
            Ok(text)
        }
    }

    fn job(language: &str) -> Job {
        Job {
            section: "Legality".to_string(),
            language: language.to_string(),
            input_path: PathBuf::from("in.csv"),
            table_path: PathBuf::from("t.csv"),
            rubric_path: PathBuf::from("r.txt"),
        }
    }

    fn runner(stage: Stage, oracle: Arc<Echo>) -> StageRunner {
        StageRunner::new(
            stage,
            OracleClient::new(oracle, RetryPolicy::immediate(2)),
            ColumnLayout::default(),
            Duration::ZERO,
        )
    }

    fn seeded(questions: &[&str]) -> Table {
        let layout = ColumnLayout::default();
        let mut table = Table::new(vec![layout.original.clone(), layout.input.clone()]);
        for q in questions {
            table.push_record(vec![q.to_string(), q.to_string()]);
        }
        table
    }

    #[tokio::test]
    async fn test_generation_writes_text_and_error_marker() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.csv");
        let oracle = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let job = job("Hindi");
        let ctx = StageContext {
            job: &job,
            rubric: None,
            evaluation_language: "English",
        };

        let mut table = seeded(&["hello", "please fail"]);
        let report = runner(Stage::Generate, oracle.clone())
            .run(&ctx, &mut table, &path)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.oracle_calls, 2);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
        assert_eq!(table.cell(0, "Model Response"), Some("hello"));

        let failed = table.cell(1, "Model Response").unwrap();
        assert!(failed.starts_with("[GENERATION_ERROR:"));
        assert!(failed.contains("refused"));
        assert_eq!(Table::load(&path).unwrap(), table);
    }

    #[tokio::test]
    async fn test_translation_passthrough_for_canonical_language() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.csv");
        let oracle = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let job = job("english");
        let ctx = StageContext {
            job: &job,
            rubric: None,
            evaluation_language: "English",
        };

        let mut table = seeded(&["q"]);
        table.set_cell(0, "Model Response", "answer");

        let report = runner(Stage::Translate, oracle.clone())
            .run(&ctx, &mut table, &path)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.oracle_calls, 0);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(table.cell(0, "English Translation"), Some("answer"));
    }

    #[tokio::test]
    async fn test_translation_blocked_by_failed_generation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.csv");
        let oracle = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let job = job("Hindi");
        let ctx = StageContext {
            job: &job,
            rubric: None,
            evaluation_language: "English",
        };

        let mut table = seeded(&["a", "b"]);
        table.set_cell(0, "Model Response", "[GENERATION_ERROR: oracle call failed: 500]");
        table.set_cell(1, "Model Response", "jawab");

        let report = runner(Stage::Translate, oracle.clone())
            .run(&ctx, &mut table, &path)
            .await
            .unwrap();

        assert_eq!(report.blocked, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(table
            .cell(0, "English Translation")
            .unwrap()
            .starts_with("[TRANSLATION_ERROR:"));
        assert_eq!(table.cell(1, "English Translation"), Some("EN:jawab"));
    }

    #[tokio::test]
    async fn test_grading_requires_rubric() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.csv");
        let oracle = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let job = job("Hindi");
        let ctx = StageContext {
            job: &job,
            rubric: None,
            evaluation_language: "English",
        };

        let mut table = seeded(&["a"]);
        table.set_cell(0, "English Translation", "answer");

        let err = runner(Stage::Grade, oracle)
            .run(&ctx, &mut table, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NoRubric { .. }));
    }
}

//! Pipeline orchestrator.
//!
//! Sequences stages over one job table and jobs over a work list. A job that
//! fails is logged and recorded in the summary; the batch moves on.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::Settings;
use crate::domain::{ColumnLayout, Job, JobLayout, JobSummary, Rubric, Summary};
use crate::oracle::{self, OracleClient};

use super::error::JobError;
use super::policy::Stage;
use super::runner::{StageContext, StageRunner};
use super::table::{StoreError, Table};

/// Outcome of a batch over a work list
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Jobs whose stages all ran
    pub completed: usize,

    /// `(job label, error)` for every job that ended early
    pub failed: Vec<(String, String)>,
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    layout: JobLayout,
    columns: ColumnLayout,
    /// One runner per stage, in execution order
    runners: Vec<StageRunner>,
    evaluation_language: String,
    summary_path: PathBuf,
    job_delay: Duration,
}

impl Orchestrator {
    /// Build an orchestrator with the configured oracles for the given stages.
    ///
    /// Stages always run in pipeline order, once each, whatever order they
    /// are given in.
    pub fn for_stages(settings: &Settings, stages: &[Stage]) -> Result<Self> {
        let runners = Stage::ALL
            .into_iter()
            .filter(|stage| stages.contains(stage))
            .map(|stage| -> Result<StageRunner> {
                let config = settings.oracle(stage);
                let oracle = oracle::build(config)
                    .with_context(|| format!("Failed to configure {} oracle", stage))?;

                Ok(StageRunner::new(
                    stage,
                    OracleClient::new(oracle, config.retry),
                    settings.columns.clone(),
                    settings.pacing.row_delay(stage),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(settings, runners))
    }

    /// Build an orchestrator running every configured stage
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::for_stages(settings, &settings.stages)
    }

    /// Create from prepared stage runners
    pub fn new(settings: &Settings, runners: Vec<StageRunner>) -> Self {
        Self {
            layout: settings.layout.clone(),
            columns: settings.columns.clone(),
            runners,
            evaluation_language: settings.evaluation_language.clone(),
            summary_path: settings.summary_path.clone(),
            job_delay: settings.pacing.job_delay,
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.runners.iter().map(StageRunner::stage).collect()
    }

    fn runs(&self, stage: Stage) -> bool {
        self.runners.iter().any(|r| r.stage() == stage)
    }

    /// Run every stage over one job table.
    ///
    /// The first stage error ends the job; later stages do not run.
    #[instrument(skip(self, job), fields(section = %job.section, language = %job.language))]
    pub async fn run_job(&self, job: &Job) -> Result<JobSummary, JobError> {
        let mut table = self.open_table(job)?;
        let mut rubric = None;

        for runner in &self.runners {
            // Loaded only when grading starts, so an unreadable rubric does
            // not hold back the earlier stages
            if runner.stage() == Stage::Grade && rubric.is_none() {
                rubric = Some(Rubric::load(&job.rubric_path)?);
            }

            let ctx = StageContext {
                job,
                rubric: rubric.as_ref(),
                evaluation_language: &self.evaluation_language,
            };

            let report = runner.run(&ctx, &mut table, &job.table_path).await?;
            info!(
                stage = %runner.stage(),
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Stage complete"
            );
        }

        Ok(JobSummary::from_table(job, &table, &self.columns))
    }

    /// Load the job table, seeding it from the question source on first run
    fn open_table(&self, job: &Job) -> Result<Table, JobError> {
        if job.table_path.exists() {
            return Ok(Table::load(&job.table_path)?);
        }

        if !self.runs(Stage::Generate) || !job.input_path.exists() {
            return Err(JobError::MissingInput {
                table: job.table_path.clone(),
                input: job.input_path.clone(),
            });
        }

        let source = Table::load(&job.input_path)?;
        let table = Table::seed_from(&source, &self.columns);
        table.save(&job.table_path)?;

        info!(
            rows = table.len(),
            input = %job.input_path.display(),
            "Seeded job table from question source"
        );
        Ok(table)
    }

    /// Run the work list, persisting the summary after every job.
    ///
    /// Only an unreadable existing summary aborts the batch; a failed save
    /// is logged and retried after the next job.
    #[instrument(skip_all, fields(sections = sections.len(), languages = languages.len()))]
    pub async fn run_batch(
        &self,
        sections: &[String],
        languages: &[String],
    ) -> Result<BatchReport, StoreError> {
        let mut summary = Summary::load(&self.summary_path)?;
        let mut report = BatchReport::default();
        let total = sections.len() * languages.len();
        let mut index = 0;

        info!(total, stages = ?self.stages(), "Starting batch");

        for section in sections {
            for language in languages {
                index += 1;
                if index > 1 && !self.job_delay.is_zero() {
                    tokio::time::sleep(self.job_delay).await;
                }

                let job = match self.layout.resolve(section, language) {
                    Ok(job) => job,
                    Err(e) => {
                        error!(%section, %language, error = %e, "Cannot resolve job, skipping");
                        report.failed.push((format!("{}-{}", language, section), e.to_string()));
                        continue;
                    }
                };

                info!(job = %job.label(), index, total, "Processing job");

                match self.run_job(&job).await {
                    Ok(entry) => {
                        summary.upsert(entry);
                        report.completed += 1;
                    }
                    Err(e) => {
                        error!(job = %job.label(), error = %e, schema = e.is_schema(), "Job failed");
                        summary.upsert(self.failed_entry(&job, &e));
                        report.failed.push((job.label(), e.to_string()));
                    }
                }

                if let Err(e) = summary.save(&self.summary_path) {
                    error!(
                        job = %job.label(),
                        summary = %self.summary_path.display(),
                        error = %e,
                        "Failed to persist summary"
                    );
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed.len(),
            summary = %self.summary_path.display(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Summary entry for a job that ended early, keeping row statistics when
    /// the table is readable
    fn failed_entry(&self, job: &Job, e: &JobError) -> JobSummary {
        match Table::load(&job.table_path) {
            Ok(table) => JobSummary::from_table(job, &table, &self.columns).with_error(e.to_string()),
            Err(_) => JobSummary::failed(job, e.to_string()),
        }
    }

    /// Clear the stage outputs of selected rows (1-based) and rerun the job.
    ///
    /// Only the cleared rows become not-done, so only they reach the oracles.
    #[instrument(skip(self))]
    pub async fn redo(
        &self,
        section: &str,
        language: &str,
        rows: &[usize],
    ) -> Result<JobSummary, JobError> {
        let job = self.layout.resolve(section, language)?;
        let mut table = Table::load(&job.table_path)?;

        for &row in rows {
            if row == 0 || row > table.len() {
                return Err(JobError::RowOutOfRange {
                    row,
                    rows: table.len(),
                });
            }
        }

        let columns: Vec<&str> = self
            .runners
            .iter()
            .flat_map(|r| r.stage().output_columns(&self.columns))
            .filter(|c| *c != self.columns.input)
            .collect();

        for &row in rows {
            for column in &columns {
                if table.has_column(column) {
                    table.set_cell(row - 1, column, "");
                }
            }
        }
        table.save(&job.table_path)?;
        info!(rows = ?rows, "Cleared rows for redo");

        let result = self.run_job(&job).await;

        let entry = match &result {
            Ok(entry) => entry.clone(),
            Err(e) => self.failed_entry(&job, e),
        };
        let mut summary = Summary::load(&self.summary_path)?;
        summary.upsert(entry);
        if let Err(e) = summary.save(&self.summary_path) {
            warn!(error = %e, "Failed to update summary after redo");
        }

        result
    }
}

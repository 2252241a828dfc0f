//! Command-line interface for polyeval.
//!
//! Provides commands for running the batch work list, running a single
//! stage over one table, redoing selected rows and inspecting the summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::core::{Orchestrator, Stage};
use crate::domain::{Job, JobSummary, Summary};

/// polyeval - Resumable multilingual evaluation pipeline
#[derive(Parser, Debug)]
#[command(name = "polyeval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .polyeval/config.yaml discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured work list (sections x languages)
    Run {
        /// Restrict to these sections
        #[arg(short, long = "section")]
        sections: Vec<String>,

        /// Restrict to these languages
        #[arg(short, long = "language")]
        languages: Vec<String>,

        /// Restrict to these stages
        #[arg(long = "stage")]
        stages: Vec<Stage>,
    },

    /// Generate answers for one table, seeding it from a question source
    Generate {
        /// Question-source export
        input: PathBuf,

        /// Job table to create or resume
        output: PathBuf,

        /// Response language
        language: String,
    },

    /// Translate the answers of one table into the evaluation language
    Translate {
        /// Job table
        table: PathBuf,

        /// Language the answers are written in
        language: String,
    },

    /// Grade one table against a rubric
    Grade {
        /// Job table
        table: PathBuf,

        /// Rubric resource
        rubric: PathBuf,
    },

    /// Clear selected rows of a job and rerun its stages
    Redo {
        section: String,
        language: String,

        /// 1-based row numbers (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        rows: Vec<usize>,
    },

    /// Print the persisted batch summary
    Summary,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref())?;

        match self.command {
            Commands::Run {
                sections,
                languages,
                stages,
            } => run_batch(&settings, sections, languages, stages).await,
            Commands::Generate {
                input,
                output,
                language,
            } => {
                let job = table_job(&output, input, language, PathBuf::new());
                run_single(&settings, Stage::Generate, &job).await
            }
            Commands::Translate { table, language } => {
                let job = table_job(&table, table.clone(), language, PathBuf::new());
                run_single(&settings, Stage::Translate, &job).await
            }
            Commands::Grade { table, rubric } => {
                let language = settings.evaluation_language.clone();
                let job = table_job(&table, table.clone(), language, rubric);
                run_single(&settings, Stage::Grade, &job).await
            }
            Commands::Redo {
                section,
                language,
                rows,
            } => redo(&settings, &section, &language, &rows).await,
            Commands::Summary => show_summary(&settings),
            Commands::Config => show_config(&settings),
        }
    }
}

/// Run the work list
async fn run_batch(
    settings: &Settings,
    sections: Vec<String>,
    languages: Vec<String>,
    stages: Vec<Stage>,
) -> Result<()> {
    let sections = if sections.is_empty() {
        settings.sections()
    } else {
        sections
    };
    let languages = if languages.is_empty() {
        settings.languages.clone()
    } else {
        languages
    };
    let stages = if stages.is_empty() {
        settings.stages.clone()
    } else {
        stages
    };

    let orchestrator = Orchestrator::for_stages(settings, &stages)?;
    let report = orchestrator
        .run_batch(&sections, &languages)
        .await
        .context("Failed to persist batch summary")?;

    println!("Completed jobs: {}", report.completed);
    if !report.failed.is_empty() {
        println!("Failed jobs:    {}", report.failed.len());
        for (job, error) in &report.failed {
            println!("  {}: {}", job, error);
        }
    }
    println!("Summary: {}", settings.summary_path.display());

    Ok(())
}

/// Job for a table addressed directly on the command line
fn table_job(table: &Path, input: PathBuf, language: String, rubric: PathBuf) -> Job {
    let section = table
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Job {
        section,
        language,
        input_path: input,
        table_path: table.to_path_buf(),
        rubric_path: rubric,
    }
}

/// Run one stage over one table
async fn run_single(settings: &Settings, stage: Stage, job: &Job) -> Result<()> {
    let orchestrator = Orchestrator::for_stages(settings, &[stage])?;
    let summary = orchestrator
        .run_job(job)
        .await
        .with_context(|| format!("{} failed for {}", stage, job.table_path.display()))?;

    print_entry(&summary)
}

/// Targeted redo of selected rows
async fn redo(settings: &Settings, section: &str, language: &str, rows: &[usize]) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    let summary = orchestrator
        .redo(section, language, rows)
        .await
        .with_context(|| format!("Redo failed for {}-{}", language, section))?;

    print_entry(&summary)
}

fn print_entry(summary: &JobSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to render summary")?;
    println!("{}", json);
    Ok(())
}

/// Print the persisted summary
fn show_summary(settings: &Settings) -> Result<()> {
    let summary = Summary::load(&settings.summary_path)
        .with_context(|| format!("Failed to read {}", settings.summary_path.display()))?;

    if summary.entries.is_empty() {
        println!("No summary at {}", settings.summary_path.display());
        return Ok(());
    }

    println!(
        "{:<40} {:>6} {:>9} {:>6} {:>7} {:>8}",
        "TABLE", "ROWS", "EVALUATED", "ERRORS", "PENDING", "AVERAGE"
    );
    println!("{}", "-".repeat(81));

    for entry in &summary.entries {
        let average = entry
            .average_grade
            .map(|g| format!("{:.2}", g))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} {:>6} {:>9} {:>6} {:>7} {:>8}",
            entry.filename,
            entry.total_rows,
            entry.evaluated_rows,
            entry.error_rows,
            entry.pending_rows,
            average
        );
        if let Some(error) = &entry.error {
            println!("  error: {}", error);
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(settings: &Settings) -> Result<()> {
    println!("polyeval configuration");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Root:      {}", settings.root.display());
    println!("  Questions: {}", settings.layout.questions_dir.display());
    println!("  Tables:    {}", settings.layout.output_dir.display());
    println!("  Rubrics:   {}", settings.layout.rubrics_dir.display());
    println!("  Summary:   {}", settings.summary_path.display());
    println!();
    println!("Sections:");
    for (section, rubric) in &settings.layout.rubrics {
        println!("  {}: {}", section, rubric);
    }
    println!();
    println!("Languages: {}", settings.languages.join(", "));
    println!(
        "Stages:    {}",
        settings
            .stages
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Evaluation language: {}", settings.evaluation_language);
    println!();
    println!("Oracles:");
    for stage in Stage::ALL {
        let oracle = settings.oracle(stage);
        println!(
            "  {:<10} {:?} model={} attempts={} delay={}ms",
            stage.as_str(),
            oracle.provider,
            oracle.model.as_deref().unwrap_or("-"),
            oracle.retry.attempts(),
            oracle.retry.delay_ms
        );
    }
    println!();
    println!("Pacing:");
    println!("  Row delay:       {:?}", settings.pacing.row_delay);
    println!("  Grade row delay: {:?}", settings.pacing.grade_row_delay);
    println!("  Job delay:       {:?}", settings.pacing.job_delay);

    Ok(())
}

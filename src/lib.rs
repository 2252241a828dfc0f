//! polyeval - Resumable multilingual evaluation pipeline
//!
//! Runs generate, translate and grade stages over CSV job tables, one row
//! at a time, through external oracles (LLM and translation services).
//!
//! # Architecture
//!
//! The job table is the checkpoint:
//! - Every row mutation is persisted atomically before the next row starts
//! - "Done" is derived from cell content, so a rerun skips finished rows
//! - Oracle failures are written into the table, never raised past a stage
//!
//! # Modules
//!
//! - `core`: Row Store, Stage Policy, Stage Runner, Orchestrator
//! - `oracle`: Oracle trait, retry client, concrete providers
//! - `domain`: Data structures (Row, Job, Summary)
//! - `config`: Settings discovery and resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the whole work list
//! polyeval run
//!
//! # Grade one table
//! polyeval grade LLMEvals/Hindi-Legality-Evals.csv rubrics/Legality-Rubric.csv
//!
//! # Redo rows 3 and 7 of a job
//! polyeval redo Legality Hindi --rows 3,7
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod oracle;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{Orchestrator, Stage, StageRunner, Table};
pub use domain::{Grade, Job, Row, Summary};
pub use oracle::{Oracle, OracleClient, OracleRequest, OracleResult};

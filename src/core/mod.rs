//! Core pipeline logic.
//!
//! This module contains:
//! - Table: the Row Store, one CSV job table persisted atomically
//! - Policy: per-stage done / upstream-ready predicates
//! - Runner: applies one stage to every not-yet-done row
//! - Orchestrator: sequences stages per job and jobs per batch

pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod runner;
pub mod table;

// Re-export commonly used types
pub use error::JobError;
pub use orchestrator::{BatchReport, Orchestrator};
pub use policy::{is_done, is_error_marker, is_upstream_ready, Stage};
pub use retry::RetryPolicy;
pub use runner::{StageContext, StageReport, StageRunner};
pub use table::{StoreError, Table};

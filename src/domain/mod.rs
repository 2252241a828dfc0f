//! Domain types for the polyeval pipeline.
//!
//! This module contains the core data structures:
//! - Row: typed view of one job-table row and its grade state
//! - Job: one (section, language) unit of work and its rubric
//! - Summary: per-table statistics persisted across the batch

pub mod job;
pub mod row;
pub mod summary;

// Re-export commonly used types
pub use job::{Job, JobLayout, Rubric};
pub use row::{ColumnLayout, Grade, Row, SENTINEL_GRADE};
pub use summary::{JobSummary, Summary};

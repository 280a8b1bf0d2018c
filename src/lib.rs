//! courtflow: pipeline orchestrator for the court-project data collection.
//!
//! This library sequences the external parser workers and the final code
//! collector of the court project, captures their output into per-run log
//! files, and turns their exit codes into a single run verdict.

// Core modules
pub mod cli;
pub mod error;
pub mod logs;
pub mod pipeline;

// Re-export commonly used types
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineConfig, RunReport};

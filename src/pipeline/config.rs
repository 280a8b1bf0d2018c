//! Run configuration and the fixed stage plan of the collection pipeline.
//!
//! Which stages exist, their order, which ones run in parallel and which
//! tolerate failure are fixed at definition time in
//! [`PipelineConfig::default_pipeline`]; the configuration only tunes
//! ambient knobs such as directories, retention, and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::sequencer::{Pipeline, Stage};
use super::worker::WorkerSpec;

/// Errors that can occur while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration field has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration or pipeline validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory the workers run in (the project checkout).
    pub project_root: PathBuf,
    /// Directory receiving run and worker logs.
    pub logs_dir: PathBuf,
    /// File-name prefix of the main run logs.
    pub log_prefix: String,
    /// How many main logs to retain across runs.
    pub keep_logs: usize,
    /// Optional per-worker wall-clock limit.
    pub worker_timeout: Option<Duration>,
    /// Python interpreter used to launch the parser workers.
    pub python: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            logs_dir: PathBuf::from("./logs"),
            log_prefix: "collect_run".to_string(),
            keep_logs: 5,
            worker_timeout: None,
            python: PathBuf::from("python"),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project root the workers run in.
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Sets the logs directory.
    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = dir.into();
        self
    }

    /// Sets the main-log file-name prefix.
    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    /// Sets how many main logs survive rotation.
    pub fn with_keep_logs(mut self, keep: usize) -> Self {
        self.keep_logs = keep;
        self
    }

    /// Sets the per-worker timeout.
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }

    /// Sets the Python interpreter.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }

    /// Validates field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "log_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.keep_logs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "keep_logs".to_string(),
                message: "must keep at least the current run's log".to_string(),
            });
        }
        if let Some(timeout) = self.worker_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: "worker_timeout".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The fixed stage plan of the court-project collection pipeline.
    ///
    /// 1. `court_parser` discovers and parses court cases. Everything
    ///    downstream consumes its output, so its failure aborts the run.
    /// 2. `qamqor_parser` and `company_info` enrich independent data sets
    ///    and run concurrently.
    /// 3. `collect_code` bundles the parser sources into review files; a
    ///    failed bundle does not invalidate the collected data, so the
    ///    stage is tolerant.
    pub fn default_pipeline(&self) -> Pipeline {
        Pipeline::new(vec![
            Stage::sequential(
                "court_parser",
                self.python_worker("court_parser", "parsers/court_parser/main.py"),
            ),
            Stage::parallel(
                "parsers",
                vec![
                    self.python_worker("qamqor_parser", "parsers/qamqor/qamqor_parser.py"),
                    self.python_worker("company_info", "parsers/company_info/main.py"),
                ],
            ),
            Stage::sequential(
                "collect_code",
                self.python_worker("collect_code", "collect_code.py"),
            )
            .tolerant(),
        ])
    }

    fn python_worker(&self, id: &str, script: &str) -> WorkerSpec {
        let mut spec = WorkerSpec::new(id, &self.python)
            .with_arg(script)
            .with_working_dir(&self.project_root);
        if let Some(timeout) = self.worker_timeout {
            spec = spec.with_timeout(timeout);
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sequencer::StageKind;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(PipelineConfig::new()
            .with_log_prefix("")
            .validate()
            .is_err());
        assert!(PipelineConfig::new().with_keep_logs(0).validate().is_err());
        assert!(PipelineConfig::new()
            .with_worker_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_default_pipeline_shape() {
        let config = PipelineConfig::new()
            .with_project_root("/data/court_project")
            .with_worker_timeout(Duration::from_secs(3600));
        let pipeline = config.default_pipeline();
        pipeline.validate().unwrap();

        assert_eq!(pipeline.stages.len(), 3);

        let discovery = &pipeline.stages[0];
        assert_eq!(discovery.kind, StageKind::Sequential);
        assert!(!discovery.continue_on_error);

        let parallel = &pipeline.stages[1];
        assert_eq!(parallel.kind, StageKind::Parallel);
        assert_eq!(parallel.workers.len(), 2);
        assert_eq!(parallel.workers[0].id, "qamqor_parser");
        assert_eq!(parallel.workers[1].id, "company_info");

        let collector = &pipeline.stages[2];
        assert!(collector.continue_on_error);

        for stage in &pipeline.stages {
            for worker in &stage.workers {
                assert_eq!(worker.working_dir, PathBuf::from("/data/court_project"));
                assert_eq!(worker.timeout, Some(Duration::from_secs(3600)));
            }
        }
    }
}

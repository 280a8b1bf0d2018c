//! Top-level error type for pipeline runs.
//!
//! The taxonomy is deliberately small. Worker-level failures (a binary that
//! cannot be launched, a non-zero exit, a timeout) are captured as sentinel
//! exit codes in the worker results and handled by the sequencer's
//! continue-on-error policy; they never appear here. What remains fatal is
//! invalid configuration and failing to set up the log files, because a run
//! without a log has no observable outcome.

use thiserror::Error;

use crate::logs::LogError;
use crate::pipeline::ConfigError;

/// Errors that abort a pipeline run before or outside stage execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration or pipeline-definition error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Log directory or log file could not be created or written.
    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = PipelineError::from(ConfigError::ValidationFailed(
            "pipeline has no stages".to_string(),
        ));
        assert!(err.to_string().contains("pipeline has no stages"));
    }
}

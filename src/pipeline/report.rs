//! Aggregated run outcome and the final log banner.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::logs::{LogError, LogHandle};

use super::sequencer::{StageResult, StageStatus};

const BANNER_RULE: &str =
    "================================================================================";

/// Summary of one full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier of this run.
    pub run_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// True iff every non-tolerant stage succeeded.
    pub overall_succeeded: bool,
    /// Path of the aggregated main log.
    pub main_log_path: PathBuf,
    /// Per-stage outcomes in definition order.
    pub stage_results: Vec<StageResult>,
}

impl RunReport {
    /// Aggregates stage outcomes into the final run verdict.
    ///
    /// Tolerant stages may fail (or be skipped) without sinking the run;
    /// they are still listed as failed in the report.
    pub fn summarize(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        stage_results: Vec<StageResult>,
        main_log_path: impl Into<PathBuf>,
    ) -> Self {
        let overall_succeeded = stage_results
            .iter()
            .all(|s| s.continue_on_error || s.succeeded());
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: Utc::now(),
            overall_succeeded,
            main_log_path: main_log_path.into(),
            stage_results,
        }
    }

    /// Process exit code for this run: 0 on overall success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.overall_succeeded {
            0
        } else {
            1
        }
    }

    /// Writes the human-readable closing banner to the main log.
    pub fn write_banner(&self, log: &mut LogHandle) -> Result<(), LogError> {
        log.append(BANNER_RULE)?;
        log.append(&format!("PIPELINE RUN {}", self.run_id))?;
        log.append(&format!(
            "started:  {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        ))?;
        log.append(&format!(
            "finished: {}",
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        ))?;
        for stage in &self.stage_results {
            let verdict = match stage.status {
                StageStatus::Succeeded => "OK".to_string(),
                StageStatus::Failed => match stage.first_failure_code() {
                    Some(code) => format!("ERROR (exit {code})"),
                    None => "ERROR".to_string(),
                },
                StageStatus::Skipped => "SKIPPED".to_string(),
                other => other.to_string(),
            };
            log.append(&format!("  {:<16} {}", stage.stage_name, verdict))?;
        }
        log.append(if self.overall_succeeded {
            "RESULT: SUCCESS"
        } else {
            "RESULT: FAILURE"
        })?;
        log.append(BANNER_RULE)
    }

    /// Saves the report as JSON next to the logs, best-effort.
    pub fn save(&self, dir: &Path) {
        let path = dir.join(format!("{}_report.json", self.run_id));
        match serde_json::to_string_pretty(self) {
            Ok(json) => match std::fs::write(&path, json) {
                Ok(()) => debug!("saved run report to {}", path.display()),
                Err(e) => warn!("could not save run report: {}", e),
            },
            Err(e) => warn!("could not serialize run report: {}", e),
        }
    }
}

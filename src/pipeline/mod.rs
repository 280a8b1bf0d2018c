//! Pipeline orchestration for the court-project data collection.
//!
//! The orchestration engine is split into small components:
//!
//! - **Worker**: one external program invocation, captured into a log
//! - **ConcurrentGroup**: a fixed worker set run concurrently and joined on
//! - **StageSequencer**: the ordered state machine driving the stages
//! - **RunReport**: the aggregated outcome deciding the process exit code
//!
//! # Run Flow
//!
//! 1. Old run logs are rotated away (best-effort)
//! 2. The main run log is created; failure here aborts immediately
//! 3. The sequencer executes stages in definition order, applying the
//!    per-stage continue-on-error policy
//! 4. Parallel-stage worker logs are merged into the main log in
//!    submission order
//! 5. The report banner is written and the exit code derived

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::logs::LogSink;

pub mod config;
pub mod group;
pub mod report;
pub mod sequencer;
pub mod worker;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use group::ConcurrentGroup;
pub use report::RunReport;
pub use sequencer::{
    Pipeline, SequencerState, Stage, StageKind, StageResult, StageSequencer, StageStatus,
};
pub use worker::{WorkerExecutor, WorkerResult, WorkerRunner, WorkerSpec};

/// Runs one pipeline to completion and returns its report.
///
/// Per-worker failures never surface as errors here; they are folded into
/// the report. The only fatal conditions are invalid configuration and a
/// log setup failure, because without a log the run has no observable
/// outcome.
pub async fn run_pipeline(
    config: &PipelineConfig,
    pipeline: &Pipeline,
) -> Result<RunReport, PipelineError> {
    run_pipeline_with(config, pipeline, Arc::new(WorkerRunner)).await
}

/// Like [`run_pipeline`] but with an injectable worker executor.
pub async fn run_pipeline_with<E: WorkerExecutor + 'static>(
    config: &PipelineConfig,
    pipeline: &Pipeline,
    executor: Arc<E>,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    pipeline.validate()?;

    let run_id = format!("run-{}", Uuid::new_v4());
    let started_at = Utc::now();

    let sink = LogSink::new(&config.logs_dir);
    // Leave room for this run's log so at most keep_logs remain afterwards.
    let keep = config.keep_logs.saturating_sub(1);
    let mut rotated = sink.rotate(&config.log_prefix, keep);
    for stage in &pipeline.stages {
        if stage.kind == StageKind::Parallel {
            for worker in &stage.workers {
                let prefix = format!("{}_{}", config.log_prefix, worker.id);
                rotated += sink.rotate(&prefix, keep);
            }
        }
    }
    if rotated > 0 {
        info!("rotated away {} old run log(s)", rotated);
    }

    let mut main_log = sink.new_run_log(&config.log_prefix)?;
    info!("run {} logging to {}", run_id, main_log.path().display());
    main_log.append(&format!(
        "[courtflow] run {} started {}",
        run_id,
        started_at.format("%Y-%m-%d %H:%M:%S")
    ))?;

    let main_log_path = main_log.path().to_path_buf();
    let mut sequencer = StageSequencer::new(executor, sink, config.log_prefix.clone());
    let stage_results = sequencer.run(pipeline, &mut main_log).await?;

    let report = RunReport::summarize(run_id, started_at, stage_results, main_log_path);
    report.write_banner(&mut main_log)?;
    report.save(&config.logs_dir);

    info!(
        "run {} finished: {}",
        report.run_id,
        if report.overall_succeeded {
            "success"
        } else {
            "failure"
        }
    );
    Ok(report)
}

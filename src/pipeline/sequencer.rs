//! Stage definitions and the top-level sequencing state machine.
//!
//! The sequencer walks the pipeline strictly in definition order. A stage is
//! either a single sequential worker, which writes straight into the main
//! log, or a parallel group whose per-worker logs are merged in afterwards.
//! A failed stage either aborts the remainder of the run or is tolerated,
//! depending on its continue-on-error flag; skipped stages are recorded but
//! never invoked.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::logs::{LogError, LogHandle, LogSink};

use super::config::ConfigError;
use super::group::{merge_into, ConcurrentGroup};
use super::worker::{WorkerExecutor, WorkerResult, WorkerSpec};

/// How the workers of a stage are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Exactly one worker, run to completion before the next stage.
    Sequential,
    /// Two or more workers started together and joined on.
    Parallel,
}

/// One step of the pipeline, fixed at definition time.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Human-readable stage name used in logs and reports.
    pub name: String,
    /// Dispatch mode.
    pub kind: StageKind,
    /// Workers of this stage, in submission order.
    pub workers: Vec<WorkerSpec>,
    /// Whether a failure of this stage still lets the run continue.
    pub continue_on_error: bool,
}

impl Stage {
    /// Creates a sequential stage around a single worker.
    pub fn sequential(name: impl Into<String>, worker: WorkerSpec) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Sequential,
            workers: vec![worker],
            continue_on_error: false,
        }
    }

    /// Creates a parallel stage; the worker set must hold at least two
    /// entries, which [`Pipeline::validate`] enforces.
    pub fn parallel(name: impl Into<String>, workers: Vec<WorkerSpec>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Parallel,
            workers,
            continue_on_error: false,
        }
    }

    /// Marks the stage as tolerant: its failure is recorded but does not
    /// abort the run.
    pub fn tolerant(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Per-stage lifecycle: `Pending -> Running -> {Succeeded, Failed}`, with
/// `Skipped` for stages never entered after an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Succeeded => write!(f, "succeeded"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Sequencer lifecycle: `NotStarted -> InProgress -> {Completed, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    NotStarted,
    InProgress,
    /// Every stage reached a terminal state without a fatal failure.
    Completed,
    /// A non-tolerant stage failed; remaining stages were skipped.
    Aborted,
}

/// Terminal outcome of one stage, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Name copied from the stage definition.
    pub stage_name: String,
    /// Terminal status of the stage.
    pub status: StageStatus,
    /// Tolerance flag copied from the stage definition.
    pub continue_on_error: bool,
    /// Results of the stage's workers, in submission order. Empty for
    /// skipped stages.
    pub worker_results: Vec<WorkerResult>,
}

impl StageResult {
    /// A stage succeeds only if every one of its workers exited 0.
    fn finished(stage: &Stage, worker_results: Vec<WorkerResult>) -> Self {
        let status = if worker_results.iter().all(WorkerResult::is_success) {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        Self {
            stage_name: stage.name.clone(),
            status,
            continue_on_error: stage.continue_on_error,
            worker_results,
        }
    }

    fn skipped(stage: &Stage) -> Self {
        Self {
            stage_name: stage.name.clone(),
            status: StageStatus::Skipped,
            continue_on_error: stage.continue_on_error,
            worker_results: Vec::new(),
        }
    }

    /// Returns true if the stage reached `Succeeded`.
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// First non-zero worker exit code, if any.
    pub fn first_failure_code(&self) -> Option<i32> {
        self.worker_results
            .iter()
            .find(|r| !r.is_success())
            .map(|r| r.exit_code)
    }
}

/// Ordered list of stages making up one run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates a pipeline from an ordered stage list.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Checks the structural invariants of the stage definitions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "pipeline has no stages".to_string(),
            ));
        }
        for stage in &self.stages {
            match stage.kind {
                StageKind::Sequential if stage.workers.len() != 1 => {
                    return Err(ConfigError::ValidationFailed(format!(
                        "sequential stage '{}' must have exactly one worker, has {}",
                        stage.name,
                        stage.workers.len()
                    )));
                }
                StageKind::Parallel if stage.workers.len() < 2 => {
                    return Err(ConfigError::ValidationFailed(format!(
                        "parallel stage '{}' must have at least two workers, has {}",
                        stage.name,
                        stage.workers.len()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Drives a pipeline stage by stage on a single control task.
///
/// Only this task ever writes the main log; parallel workers write their own
/// auxiliary logs, which are merged in after the whole group has joined.
pub struct StageSequencer<E> {
    executor: Arc<E>,
    sink: LogSink,
    log_prefix: String,
    state: SequencerState,
}

impl<E: WorkerExecutor + 'static> StageSequencer<E> {
    /// Creates a sequencer using `sink` for auxiliary parallel-stage logs.
    pub fn new(executor: Arc<E>, sink: LogSink, log_prefix: impl Into<String>) -> Self {
        Self {
            executor,
            sink,
            log_prefix: log_prefix.into(),
            state: SequencerState::NotStarted,
        }
    }

    /// Returns the sequencer's current lifecycle state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Executes the pipeline to completion and returns per-stage outcomes in
    /// definition order.
    ///
    /// The only error surfaced here is failing to create an auxiliary log
    /// file, which leaves a parallel stage with nowhere to capture output.
    /// Worker failures never surface as errors; they are folded into the
    /// stage results and the continue-on-error policy.
    pub async fn run(
        &mut self,
        pipeline: &Pipeline,
        main_log: &mut LogHandle,
    ) -> Result<Vec<StageResult>, LogError> {
        self.state = SequencerState::InProgress;
        let mut results = Vec::with_capacity(pipeline.stages.len());
        let mut aborted = false;

        for stage in &pipeline.stages {
            if aborted {
                info!("stage {} skipped", stage.name);
                note(main_log, &format!("[courtflow] stage {} skipped", stage.name));
                results.push(StageResult::skipped(stage));
                continue;
            }

            info!("stage {} running ({:?})", stage.name, stage.kind);
            note(main_log, &format!("[courtflow] stage {} started", stage.name));

            let worker_results = match stage.kind {
                StageKind::Sequential => {
                    vec![self.executor.run(&stage.workers[0], main_log).await]
                }
                StageKind::Parallel => self.run_parallel(stage, main_log).await?,
            };

            let result = StageResult::finished(stage, worker_results);
            match (result.succeeded(), stage.continue_on_error) {
                (true, _) => info!("stage {} succeeded", stage.name),
                (false, true) => {
                    warn!("stage {} failed, tolerated by policy", stage.name);
                }
                (false, false) => {
                    error!("stage {} failed, aborting remaining stages", stage.name);
                    aborted = true;
                }
            }
            note(
                main_log,
                &format!("[courtflow] stage {} finished: {}", stage.name, result.status),
            );
            results.push(result);
        }

        self.state = if aborted {
            SequencerState::Aborted
        } else {
            SequencerState::Completed
        };
        Ok(results)
    }

    async fn run_parallel(
        &self,
        stage: &Stage,
        main_log: &mut LogHandle,
    ) -> Result<Vec<WorkerResult>, LogError> {
        let mut workers = Vec::with_capacity(stage.workers.len());
        for spec in &stage.workers {
            let log = self.sink.new_worker_log(&self.log_prefix, &spec.id)?;
            workers.push((spec.clone(), log));
        }

        let group = ConcurrentGroup::new(Arc::clone(&self.executor));
        let results = group.run_all(workers).await;

        if let Err(e) = merge_into(main_log, &results) {
            warn!("could not merge worker logs for stage {}: {}", stage.name, e);
        }
        Ok(results)
    }
}

/// Best-effort append to the main log; a broken log mid-run is warned about,
/// not fatal.
fn note(log: &mut LogHandle, line: &str) {
    if let Err(e) = log.append(line) {
        warn!("dropping log line: {}", e);
    }
}

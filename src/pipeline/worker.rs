//! Worker processes: specifications, results, and the runner executing them.
//!
//! A worker is one external program invocation (in this project: the Python
//! parsers and the code collector). The orchestrator only relies on the
//! contract that a worker writes diagnostics to stdout/stderr, terminates,
//! and exits 0 on success. Failures to launch or finish are never propagated
//! as errors past this module: they are captured as sentinel exit codes in
//! the [`WorkerResult`] and interpreted by the sequencer.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::logs::LogHandle;

/// Exit code synthesized when a worker binary cannot be started at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code synthesized when a worker exceeds its timeout and is killed.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when a worker dies without a code (killed by signal).
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Specification of one external worker invocation.
///
/// Immutable once the pipeline is defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Stable identifier used in log section headers and reports.
    pub id: String,
    /// Executable to launch.
    pub program: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub working_dir: PathBuf,
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
    /// Optional wall-clock limit; the child is killed once it elapses.
    pub timeout: Option<Duration>,
}

impl WorkerSpec {
    /// Creates a spec for the given program with no arguments, running in
    /// the current directory.
    pub fn new(id: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Appends one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one worker invocation, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Identifier copied from the worker spec.
    pub id: String,
    /// Exit code of the child, or one of the sentinel codes.
    pub exit_code: i32,
    /// When the worker was launched.
    pub started_at: DateTime<Utc>,
    /// When the worker reached a terminal state.
    pub finished_at: DateTime<Utc>,
    /// Log file the worker's combined stdout/stderr was captured into.
    pub log_path: PathBuf,
}

impl WorkerResult {
    fn finished(id: &str, started_at: DateTime<Utc>, exit_code: i32, log_path: &Path) -> Self {
        Self {
            id: id.to_string(),
            exit_code,
            started_at,
            finished_at: Utc::now(),
            log_path: log_path.to_path_buf(),
        }
    }

    /// Returns true if the worker exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes one worker against a log target.
///
/// The seam between the sequencer and the operating system: production code
/// uses [`WorkerRunner`], tests substitute a recording spy.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    /// Runs the worker to completion, capturing its combined stdout/stderr
    /// into `log`, and returns its result. Never fails: launch errors and
    /// timeouts are reported through sentinel exit codes.
    async fn run(&self, spec: &WorkerSpec, log: &mut LogHandle) -> WorkerResult;
}

/// Real executor: spawns the worker as a child process and waits on its
/// process handle directly.
///
/// Liveness is observed through the child handle alone, never inferred from
/// process listings or other ambient process attributes.
pub struct WorkerRunner;

#[async_trait]
impl WorkerExecutor for WorkerRunner {
    async fn run(&self, spec: &WorkerSpec, log: &mut LogHandle) -> WorkerResult {
        let started_at = Utc::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            // The parsers are Python programs printing non-ASCII text.
            .env("PYTHONIOENCODING", "utf-8")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        info!("starting worker {} ({})", spec.id, spec.program.display());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("worker {} failed to start: {}", spec.id, e);
                note(
                    log,
                    &format!("[courtflow] failed to start {}: {}", spec.program.display(), e),
                );
                return WorkerResult::finished(
                    &spec.id,
                    started_at,
                    LAUNCH_FAILURE_EXIT_CODE,
                    log.path(),
                );
            }
        };

        let stdout = child.stdout.take().expect("stdout not captured");
        let stderr = child.stderr.take().expect("stderr not captured");
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let capture_and_wait = async {
            let mut stdout_done = false;
            let mut stderr_done = false;
            while !(stdout_done && stderr_done) {
                tokio::select! {
                    line = stdout_lines.next_line(), if !stdout_done => match line {
                        Ok(Some(l)) => note(log, &l),
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            warn!("worker {}: error reading stdout: {}", spec.id, e);
                            stdout_done = true;
                        }
                    },
                    line = stderr_lines.next_line(), if !stderr_done => match line {
                        Ok(Some(l)) => note(log, &l),
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            warn!("worker {}: error reading stderr: {}", spec.id, e);
                            stderr_done = true;
                        }
                    },
                }
            }
            child.wait().await
        };

        let wait_outcome = match spec.timeout {
            Some(limit) => {
                // Bind before matching so the capture future (and its
                // borrows of the child and log) is dropped first.
                let timed = tokio::time::timeout(limit, capture_and_wait).await;
                match timed {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("worker {} timed out after {:?}, killing", spec.id, limit);
                        let _ = child.kill().await;
                        note(
                            log,
                            &format!("[courtflow] worker {} timed out after {:?}", spec.id, limit),
                        );
                        return WorkerResult::finished(
                            &spec.id,
                            started_at,
                            TIMEOUT_EXIT_CODE,
                            log.path(),
                        );
                    }
                }
            }
            None => capture_and_wait.await,
        };

        let exit_code = match wait_outcome {
            Ok(status) => status.code().unwrap_or(SIGNAL_EXIT_CODE),
            Err(e) => {
                warn!("worker {}: wait failed: {}", spec.id, e);
                note(log, &format!("[courtflow] wait failed for {}: {}", spec.id, e));
                SIGNAL_EXIT_CODE
            }
        };

        info!("worker {} exited with code {}", spec.id, exit_code);
        note(
            log,
            &format!("[courtflow] worker {} exited with code {}", spec.id, exit_code),
        );

        WorkerResult::finished(&spec.id, started_at, exit_code, log.path())
    }
}

/// Appends a line, downgrading write failures to warnings.
///
/// Once a run is underway, a broken log target must not turn captured worker
/// output into a run abort; only log setup failures are fatal.
fn note(log: &mut LogHandle, line: &str) {
    if let Err(e) = log.append(line) {
        warn!("dropping log line: {}", e);
    }
}

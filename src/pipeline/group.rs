//! Concurrent execution of a fixed worker group.
//!
//! All workers of a parallel stage are started before any is awaited, each
//! supervised by its own tokio task that blocks on the child's termination.
//! Results come back in submission order regardless of finish order, and the
//! per-worker logs are merged into the parent log in that same order so the
//! main log stays deterministic and diffable across runs.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::logs::{LogError, LogHandle};

use super::worker::{WorkerExecutor, WorkerResult, WorkerSpec, SIGNAL_EXIT_CODE};

/// Runs a fixed set of workers concurrently and joins on all of them.
pub struct ConcurrentGroup<E> {
    executor: Arc<E>,
}

impl<E: WorkerExecutor + 'static> ConcurrentGroup<E> {
    /// Creates a group backed by the given executor.
    pub fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    /// Starts every worker without waiting for any, then awaits all of them.
    ///
    /// Each worker owns its log handle for the duration of the run; no state
    /// is shared between the supervising tasks beyond their join handles.
    /// The returned results are ordered by submission, not by completion.
    pub async fn run_all(&self, workers: Vec<(WorkerSpec, LogHandle)>) -> Vec<WorkerResult> {
        let mut handles = Vec::with_capacity(workers.len());
        for (spec, mut log) in workers {
            let executor = Arc::clone(&self.executor);
            let id = spec.id.clone();
            let log_path = log.path().to_path_buf();
            let task = tokio::spawn(async move { executor.run(&spec, &mut log).await });
            handles.push((id, log_path, task));
        }

        let mut results = Vec::with_capacity(handles.len());
        let joined =
            futures::future::join_all(handles.iter_mut().map(|(_, _, task)| task)).await;
        for ((id, log_path, _), outcome) in handles.iter().zip(joined) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("supervising task for worker {} panicked: {}", id, e);
                    let now = Utc::now();
                    results.push(WorkerResult {
                        id: id.clone(),
                        exit_code: SIGNAL_EXIT_CODE,
                        started_at: now,
                        finished_at: now,
                        log_path: log_path.clone(),
                    });
                }
            }
        }
        results
    }
}

/// Appends each worker's log into the parent log under a delimited section
/// header, in the order the results are given (submission order).
pub fn merge_into(main_log: &mut LogHandle, results: &[WorkerResult]) -> Result<(), LogError> {
    for result in results {
        main_log.append(&format!("=== LOG OF WORKER {} ===", result.id))?;
        main_log.append_file(&result.log_path)?;
    }
    Ok(())
}

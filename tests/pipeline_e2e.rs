//! End-to-end pipeline runs with real child processes.
//!
//! These tests drive `run_pipeline` with small `sh` workers instead of the
//! Python parsers, exercising process spawning, log capture, the parallel
//! join, the continue-on-error policy, and the final report together.

use std::fs;
use std::path::Path;

use courtflow::pipeline::{run_pipeline, Pipeline, PipelineConfig, Stage, WorkerSpec};
use tempfile::TempDir;

fn sh(id: &str, script: &str, dir: &Path) -> WorkerSpec {
    WorkerSpec::new(id, "sh")
        .with_arg("-c")
        .with_arg(script)
        .with_working_dir(dir)
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig::new()
        .with_project_root(dir)
        .with_logs_dir(dir.join("logs"))
        .with_log_prefix("e2e_run")
        .with_keep_logs(3)
}

#[tokio::test]
async fn full_run_succeeds_and_merges_worker_logs() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(vec![
        Stage::sequential("discover", sh("discover", "echo discovered cases", dir.path())),
        Stage::parallel(
            "enrich",
            vec![
                // First-submitted worker finishes last.
                sh("first", "sleep 0.2; echo first output", dir.path()),
                sh("second", "echo second output", dir.path()),
            ],
        ),
        Stage::sequential("collect", sh("collect", "echo bundled", dir.path())),
    ]);

    let report = run_pipeline(&config(dir.path()), &pipeline).await.unwrap();

    assert!(report.overall_succeeded);
    assert_eq!(report.exit_code(), 0);
    assert!(report.finished_at >= report.started_at);

    let content = fs::read_to_string(&report.main_log_path).unwrap();
    assert!(content.contains("discovered cases"));
    assert!(content.contains("bundled"));
    assert!(content.contains("RESULT: SUCCESS"));

    // Merge order follows submission order even though "second" finished first.
    let first_section = content.find("=== LOG OF WORKER first ===").unwrap();
    let second_section = content.find("=== LOG OF WORKER second ===").unwrap();
    assert!(first_section < second_section);
    assert!(content.contains("first output"));
    assert!(content.contains("second output"));

    // The JSON report lands next to the logs.
    let report_path = dir
        .path()
        .join("logs")
        .join(format!("{}_report.json", report.run_id));
    assert!(report_path.exists());
}

#[tokio::test]
async fn failed_parallel_stage_skips_the_collector() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(vec![
        Stage::sequential("discover", sh("discover", "exit 0", dir.path())),
        Stage::parallel(
            "enrich",
            vec![
                sh("good", "exit 0", dir.path()),
                sh("broken", "exit 1", dir.path()),
            ],
        ),
        Stage::sequential(
            "collect",
            sh("collect", "touch collector_ran.txt", dir.path()),
        ),
    ]);

    let report = run_pipeline(&config(dir.path()), &pipeline).await.unwrap();

    assert!(!report.overall_succeeded);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.stage_results[1].status.to_string(), "failed");
    assert_eq!(report.stage_results[2].status.to_string(), "skipped");

    // The skipped collector was never invoked.
    assert!(!dir.path().join("collector_ran.txt").exists());

    let content = fs::read_to_string(&report.main_log_path).unwrap();
    assert!(content.contains("ERROR (exit 1)"));
    assert!(content.contains("SKIPPED"));
    assert!(content.contains("RESULT: FAILURE"));
}

#[tokio::test]
async fn tolerant_failure_still_runs_downstream_stages() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(vec![
        Stage::sequential("discover", sh("discover", "exit 0", dir.path())),
        Stage::parallel(
            "enrich",
            vec![
                sh("flaky_a", "exit 2", dir.path()),
                sh("flaky_b", "exit 2", dir.path()),
            ],
        )
        .tolerant(),
        Stage::sequential(
            "collect",
            sh("collect", "touch collector_ran.txt", dir.path()),
        ),
    ]);

    let report = run_pipeline(&config(dir.path()), &pipeline).await.unwrap();

    // Tolerant stage failed, but the run as a whole still succeeds.
    assert!(report.overall_succeeded);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.stage_results[1].status.to_string(), "failed");
    assert_eq!(report.stage_results[2].status.to_string(), "succeeded");
    assert!(dir.path().join("collector_ran.txt").exists());
}

#[tokio::test]
async fn invalid_pipeline_is_rejected_before_any_worker_runs() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(vec![Stage::parallel(
        "half-group",
        vec![sh("lonely", "touch should_not_exist.txt", dir.path())],
    )]);

    let result = run_pipeline(&config(dir.path()), &pipeline).await;

    assert!(result.is_err());
    assert!(!dir.path().join("should_not_exist.txt").exists());
    // No log file is created for a rejected run.
    assert!(!dir.path().join("logs").exists());
}

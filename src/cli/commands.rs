//! CLI command definitions for courtflow.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::pipeline::{self, PipelineConfig, StageKind};

/// Default logs directory relative to the project root.
const DEFAULT_LOGS_DIR: &str = "./logs";

/// Default file-name prefix for main run logs.
const DEFAULT_LOG_PREFIX: &str = "collect_run";

/// Pipeline orchestrator for the court-project data-collection parsers.
#[derive(Parser)]
#[command(name = "courtflow")]
#[command(about = "Run the court-project data-collection pipeline")]
#[command(version)]
#[command(
    long_about = "courtflow sequences the court-project parser workers and the final code \
collector, capturing all worker output into per-run log files.\n\nExample usage:\n  \
courtflow run --project-root /data/court_project --keep 5 --timeout-secs 3600"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full collection pipeline.
    Run(RunArgs),

    /// Print the stage plan without executing anything.
    Plan(PlanArgs),
}

/// Arguments for `courtflow run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Project root directory the workers run in.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Directory receiving run and worker logs.
    #[arg(long, default_value = DEFAULT_LOGS_DIR)]
    pub logs_dir: PathBuf,

    /// File-name prefix of the main run logs.
    #[arg(long, default_value = DEFAULT_LOG_PREFIX)]
    pub log_prefix: String,

    /// How many main run logs to retain across runs.
    #[arg(long, default_value = "5")]
    pub keep: usize,

    /// Per-worker timeout in seconds; a worker exceeding it is killed.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Python interpreter used to launch the parser workers.
    #[arg(long, default_value = "python", env = "COURTFLOW_PYTHON")]
    pub python: PathBuf,
}

impl RunArgs {
    fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new()
            .with_project_root(&self.project_root)
            .with_logs_dir(&self.logs_dir)
            .with_log_prefix(self.log_prefix.clone())
            .with_keep_logs(self.keep)
            .with_python(&self.python);
        if let Some(secs) = self.timeout_secs {
            config = config.with_worker_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Arguments for `courtflow plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Project root directory used to resolve worker paths.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,
}

/// Parses the command line.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed command and returns the process exit code.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run(args) => {
            let config = args.to_config();
            let pipeline = config.default_pipeline();
            let report = pipeline::run_pipeline(&config, &pipeline).await?;

            for stage in &report.stage_results {
                info!("stage {}: {}", stage.stage_name, stage.status);
            }
            info!(
                "run {} {} (log: {})",
                report.run_id,
                if report.overall_succeeded {
                    "succeeded"
                } else {
                    "failed"
                },
                report.main_log_path.display()
            );
            Ok(report.exit_code())
        }
        Commands::Plan(args) => {
            let config = PipelineConfig::new().with_project_root(&args.project_root);
            let pipeline = config.default_pipeline();

            println!("Stage plan:");
            for (index, stage) in pipeline.stages.iter().enumerate() {
                let mode = match stage.kind {
                    StageKind::Sequential => "sequential",
                    StageKind::Parallel => "parallel",
                };
                let policy = if stage.continue_on_error {
                    "continue on error"
                } else {
                    "abort on error"
                };
                println!("  {}. {} [{mode}, {policy}]", index + 1, stage.name);
                for worker in &stage.workers {
                    println!(
                        "       {} -> {} {}",
                        worker.id,
                        worker.program.display(),
                        worker.args.join(" ")
                    );
                }
            }
            Ok(0)
        }
    }
}

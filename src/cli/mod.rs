//! Command-line interface for courtflow.
//!
//! Provides the `run` command executing the collection pipeline and the
//! `plan` command printing the stage table without running anything.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};

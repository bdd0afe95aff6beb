// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `actiongraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "actiongraph",
    version,
    about = "Run a graph of build actions concurrently, in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the action graph file (TOML).
    #[arg(long, value_name = "PATH", default_value = "ActionGraph.toml")]
    pub config: String,

    /// Maximum number of concurrently running actions.
    ///
    /// Overrides `[config].jobs`; defaults to the available parallelism.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Cap on the summed weight of concurrently running actions.
    #[arg(long, value_name = "W")]
    pub max_weight: Option<f64>,

    /// Number of sink actions to run in a separate, final local phase.
    ///
    /// Overrides `[config].local_sinks`; `0` disables partitioning.
    #[arg(long, value_name = "K")]
    pub local_sinks: Option<usize>,

    /// Stop dispatching new actions after the first failure.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Skip the artifact-check phase for every action.
    #[arg(long)]
    pub no_cache: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ACTIONGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print actions and the partition plan, but don't
    /// execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

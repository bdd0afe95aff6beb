// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod partition;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{CancelToken, Engine, EngineOptions, Reporter, RunnerConfig, StallOptions};
use crate::errors::ActionGraphError;
use crate::exec::{CacheRunner, FingerprintStore, ProcessRunner, SummaryReporter};
use crate::graph::ActionGraph;
use crate::partition::{EngineExecutor, PhaseExecutor, plan_partition, run_partitioned};
use crate::types::ActionPhase;

/// Effective run settings after merging CLI flags over `[config]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub jobs: usize,
    pub max_weight: Option<f64>,
    pub local_sinks: usize,
    pub stop_on_error: bool,
    pub cache: bool,
    pub stall: StallOptions,
}

impl RunSettings {
    /// CLI flags win over the config file; `jobs` falls back to the
    /// available parallelism.
    ///
    /// CLI limits get the same range checks as their `[config]` keys.
    pub fn resolve(args: &CliArgs, cfg: &ConfigFile) -> errors::Result<Self> {
        if args.jobs == Some(0) {
            return Err(ActionGraphError::ConfigError(
                "--jobs must be >= 1 (got 0)".to_string(),
            ));
        }
        if let Some(max_weight) = args.max_weight {
            if !max_weight.is_finite() || max_weight <= 0.0 {
                return Err(ActionGraphError::ConfigError(format!(
                    "--max-weight must be a positive number (got {max_weight})"
                )));
            }
        }

        let jobs = args.jobs.or(cfg.config.jobs).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let abort_after = match cfg.config.stall_abort_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            jobs,
            max_weight: args.max_weight.or(cfg.config.max_weight),
            local_sinks: args.local_sinks.unwrap_or(cfg.config.local_sinks),
            stop_on_error: args.stop_on_error || cfg.config.stop_on_error,
            cache: !args.no_cache && cfg.config.cache,
            stall: StallOptions {
                threshold: Duration::from_secs(cfg.config.stall_threshold_secs),
                abort_after,
                ..StallOptions::default()
            },
        })
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - the process runner and (optionally) the artifact cache
/// - local/remote partitioning
/// - Ctrl-C handling
///
/// Returns `Ok(false)` if any action failed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let settings = RunSettings::resolve(&args, &cfg)?;
    cfg.config.cache = settings.cache;
    let graph = ActionGraph::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&graph, &settings)?;
        return Ok(true);
    }

    let root = config_root_dir(&config_path);
    let cancel = CancelToken::new();

    // Ctrl-C → cancel every engine sharing the token.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; canceling run");
            cancel.cancel();
        });
    }

    let summary = Arc::new(SummaryReporter::new());
    let reporter: Arc<dyn Reporter> = summary.clone();
    let handle = Handle::current();

    info!(
        actions = graph.len(),
        jobs = settings.jobs,
        local_sinks = settings.local_sinks,
        cache = settings.cache,
        "starting action graph"
    );

    let success = tokio::task::spawn_blocking(move || {
        execute_graph(graph, &settings, &root, cancel, handle, reporter)
    })
    .await
    .context("engine thread panicked")??;

    summary.print_summary();
    Ok(success)
}

/// Run `graph` to completion on the current (blocking) thread.
fn execute_graph(
    graph: ActionGraph,
    settings: &RunSettings,
    root: &Path,
    cancel: CancelToken,
    handle: Handle,
    reporter: Arc<dyn Reporter>,
) -> Result<bool> {
    let store = if settings.cache && graph.actions().iter().any(|a| a.artifact_check) {
        Some(Arc::new(FingerprintStore::open(root)?))
    } else {
        None
    };

    let options = EngineOptions {
        stop_on_error: settings.stop_on_error,
        stall: Some(settings.stall),
        cancel,
    };

    let register = |engine: &Engine| {
        register_runners(engine, settings, root, &handle, store.as_ref());
    };

    if settings.local_sinks == 0 {
        let mut executor =
            EngineExecutor::new("local", options, register).with_reporter(reporter);
        return Ok(executor.execute(graph)?);
    }

    let mut remote = EngineExecutor::new("remote", options.clone(), register)
        .with_reporter(Arc::clone(&reporter));
    let mut local = EngineExecutor::new("local", options, register).with_reporter(reporter);
    let outcome = run_partitioned(&graph, settings.local_sinks, &mut remote, &mut local)?;

    debug!(?outcome, "partitioned run complete");
    Ok(outcome.success())
}

fn register_runners(
    engine: &Engine,
    settings: &RunSettings,
    root: &Path,
    handle: &Handle,
    store: Option<&Arc<FingerprintStore>>,
) {
    let mut process = ProcessRunner::new(handle.clone(), root);
    if let Some(store) = store {
        process = process.with_fingerprints(Arc::clone(store));
    }

    let mut compile = RunnerConfig::automatic("compile", ActionPhase::Compile, settings.jobs);
    if let Some(max_weight) = settings.max_weight {
        compile = compile.with_max_weight(max_weight);
    }
    engine.add_runner(compile, Arc::new(process));

    if let Some(store) = store {
        engine.add_runner(
            RunnerConfig::automatic("artifact-cache", ActionPhase::ArtifactCheck, settings.jobs),
            Arc::new(CacheRunner::new(Arc::clone(store))),
        );
    }
}

/// Figure out the project root that commands run in.
///
/// - If the config path has a non-empty parent (e.g. "build/ActionGraph.toml"),
///   we use that directory.
/// - If it's just a bare filename like "ActionGraph.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: settings, actions in dependency order, and the
/// partition plan.
fn print_dry_run(graph: &ActionGraph, settings: &RunSettings) -> Result<()> {
    println!("actiongraph dry-run");
    println!("  jobs = {}", settings.jobs);
    if let Some(max_weight) = settings.max_weight {
        println!("  max_weight = {max_weight}");
    }
    println!("  stop_on_error = {}", settings.stop_on_error);
    println!("  cache = {}", settings.cache);
    println!();

    println!("actions ({}):", graph.len());
    for index in graph.topological_order()? {
        let Some(action) = graph.get(index) else {
            continue;
        };
        println!("  - {}", action.name);
        match action.command {
            Some(ref cmd) => println!("      cmd: {cmd}"),
            None => println!("      (phony)"),
        }
        if !action.prerequisites.is_empty() {
            let after: Vec<&str> = action
                .prerequisites
                .iter()
                .filter_map(|&p| graph.get(p).map(|a| a.name.as_str()))
                .collect();
            println!("      after: {after:?}");
        }
        if action.weight != 1.0 {
            println!("      weight: {}", action.weight);
        }
        if action.artifact_check {
            println!("      cache: true");
        }
    }

    if settings.local_sinks > 0 {
        let plan = plan_partition(graph, settings.local_sinks);
        let names = |indices: &[usize]| -> Vec<String> {
            indices
                .iter()
                .filter_map(|&i| graph.get(i).map(|a| a.name.clone()))
                .collect()
        };
        println!();
        println!("partition (local_sinks = {}):", settings.local_sinks);
        println!("  remote: {:?}", names(&plan.remote));
        println!("  local:  {:?}", names(&plan.local));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

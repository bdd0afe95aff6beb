// src/partition/executor.rs

//! Two-phase execution of a partitioned graph.

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::{Engine, EngineOptions, Reporter};
use crate::errors::Result;
use crate::graph::ActionGraph;
use crate::partition::planner::{plan_partition, Partition};

/// Backend that runs a whole (sub)graph to completion.
///
/// The remote distribution backend implements this with its own protocol;
/// [`EngineExecutor`] implements it with a local scheduling engine.
pub trait PhaseExecutor {
    fn name(&self) -> &str;

    /// Run every action of `graph`; `Ok(false)` if any action failed.
    fn execute(&mut self, graph: ActionGraph) -> Result<bool>;
}

/// What happened in each phase of a partitioned run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRun {
    pub plan: Partition,
    /// `None` if the remote set was empty and the phase was skipped.
    pub remote_success: Option<bool>,
    /// `None` if the phase was skipped (empty set, or remote failure).
    pub local_success: Option<bool>,
}

impl PartitionRun {
    pub fn success(&self) -> bool {
        self.remote_success != Some(false) && self.local_success != Some(false)
    }
}

/// Split `graph` and run the remote set, then (only on success) the local set.
pub fn run_partitioned(
    graph: &ActionGraph,
    max_local: usize,
    remote: &mut dyn PhaseExecutor,
    local: &mut dyn PhaseExecutor,
) -> Result<PartitionRun> {
    let plan = plan_partition(graph, max_local);
    info!(
        local = plan.local.len(),
        remote = plan.remote.len(),
        remote_backend = remote.name(),
        local_backend = local.name(),
        "running partitioned action graph"
    );

    let remote_success = if plan.remote.is_empty() {
        None
    } else {
        Some(remote.execute(graph.subset(&plan.remote))?)
    };

    if remote_success == Some(false) {
        warn!(
            backend = remote.name(),
            skipped = plan.local.len(),
            "remote phase failed; not running local phase"
        );
        return Ok(PartitionRun {
            plan,
            remote_success,
            local_success: None,
        });
    }

    let local_success = if plan.local.is_empty() {
        None
    } else {
        Some(local.execute(graph.subset(&plan.local))?)
    };

    Ok(PartitionRun {
        plan,
        remote_success,
        local_success,
    })
}

/// [`PhaseExecutor`] backed by a fresh [`Engine`] per call.
///
/// `configure` registers runners on each new engine before it starts.
pub struct EngineExecutor<F> {
    name: String,
    options: EngineOptions,
    reporter: Option<Arc<dyn Reporter>>,
    configure: F,
}

impl<F> EngineExecutor<F>
where
    F: FnMut(&Engine),
{
    pub fn new(name: impl Into<String>, options: EngineOptions, configure: F) -> Self {
        Self {
            name: name.into(),
            options,
            reporter: None,
            configure,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

impl<F> PhaseExecutor for EngineExecutor<F>
where
    F: FnMut(&Engine),
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, graph: ActionGraph) -> Result<bool> {
        let engine = match self.reporter {
            Some(ref reporter) => {
                Engine::with_reporter(graph, self.options.clone(), Arc::clone(reporter))
            }
            None => Engine::new(graph, self.options.clone()),
        };
        (self.configure)(&engine);
        engine.start();
        Ok(engine.run_until_done())
    }
}

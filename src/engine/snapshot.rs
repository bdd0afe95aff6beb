// src/engine/snapshot.rs

//! Point-in-time views of an engine, for diagnostics and tests.

use std::fmt;
use std::time::Duration;

use crate::engine::runner::RunnerId;
use crate::engine::state::StatusCounts;
use crate::types::{ActionPhase, ActionStatus, RunnerKind};

/// Copy of the engine's observable state, taken under its lock.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// State-change counter; advances on every action transition.
    pub generation: u64,
    pub counts: StatusCounts,
    pub runners: Vec<RunnerSnapshot>,
    /// `(status, phase)` per action index.
    pub actions: Vec<(ActionStatus, ActionPhase)>,
}

#[derive(Debug, Clone)]
pub struct RunnerSnapshot {
    pub id: RunnerId,
    pub name: String,
    pub kind: RunnerKind,
    pub phase: ActionPhase,
    pub active_count: usize,
    pub max_count: usize,
    pub active_weight: f64,
    pub max_weight: Option<f64>,
    /// Descriptions of the actions currently running on this runner.
    pub running: Vec<String>,
}

/// Diagnostic dump emitted by the stall monitor.
#[derive(Debug, Clone)]
pub struct StallReport {
    pub stalled_for: Duration,
    pub snapshot: EngineSnapshot,
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = &self.snapshot.counts;
        writeln!(
            f,
            "no progress for {:.1}s (queued={}, running={}, finished={}, error={})",
            self.stalled_for.as_secs_f64(),
            counts.queued,
            counts.running,
            counts.finished,
            counts.error
        )?;

        for runner in &self.snapshot.runners {
            write!(
                f,
                "  {} [{:?}, {}] active {}/{}",
                runner.name, runner.kind, runner.phase, runner.active_count, runner.max_count
            )?;
            if let Some(max) = runner.max_weight {
                write!(f, ", weight {:.1}/{:.1}", runner.active_weight, max)?;
            }
            writeln!(f)?;
            for description in &runner.running {
                writeln!(f, "    - {description}")?;
            }
        }

        Ok(())
    }
}

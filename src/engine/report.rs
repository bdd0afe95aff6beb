// src/engine/report.rs

//! Results, job completions and the reporting callback.

use std::time::Duration;

use crate::engine::cancel::CancelToken;
use crate::engine::snapshot::StallReport;
use crate::types::ActionStatus;

/// Outcome details of one action, passed through the engine untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub exit_code: Option<i32>,
    /// Captured stdout/stderr (or a short diagnostic for synthetic results).
    pub output: String,
    pub duration: Duration,
    /// The action was stopped (or never started) because of cancellation.
    pub canceled: bool,
}

impl ActionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            ..Self::default()
        }
    }

    /// Canceled results carry no log content.
    pub fn canceled() -> Self {
        Self {
            canceled: true,
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// What a finished job reports back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Finished(ActionResult),
    Failed(ActionResult),
    /// Artifact-check miss: send the action on to the compile phase.
    Requeue,
}

/// Opaque unit of work returned by `Runner::try_run`.
///
/// The engine runs it exactly once, outside its lock, and records the
/// returned [`Completion`]. A panicking job is recorded as a failure.
pub type Job = Box<dyn FnOnce(&CancelToken) -> Completion + Send + 'static>;

/// One terminal action, as delivered to a [`Reporter`].
#[derive(Debug, Clone)]
pub struct ActionReport {
    /// Index in the engine's own graph. A partitioned run gives each phase
    /// a re-indexed subset, so `name` is the stable key across phases.
    pub index: usize,
    pub name: String,
    pub description: String,
    pub status: ActionStatus,
    pub result: Option<ActionResult>,
}

/// Observational sink for progress and summary output.
///
/// Called outside the engine lock. `on_action_terminal` fires exactly once
/// per action that reaches `Finished` or `Error`.
pub trait Reporter: Send + Sync {
    fn on_action_terminal(&self, report: &ActionReport);

    fn on_stall(&self, _report: &StallReport) {}
}

// src/engine/state.rs

//! Per-action mutable state and readiness computation.

use crate::engine::report::ActionResult;
use crate::engine::runner::RunnerId;
use crate::graph::Action;
use crate::types::{ActionPhase, ActionStatus};

/// Mutable scheduling state of one action. Owned by the engine lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionState {
    pub status: ActionStatus,
    pub phase: ActionPhase,
    pub assigned_runner: Option<RunnerId>,
    pub result: Option<ActionResult>,
}

impl ActionState {
    pub fn new(action: &Action) -> Self {
        Self {
            status: ActionStatus::Queued,
            phase: action.initial_phase(),
            assigned_runner: None,
            result: None,
        }
    }
}

/// Whether a queued action can be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
    /// The prerequisite at this index ended in `Error`.
    Failed(usize),
}

/// Pure function of the current state array.
///
/// Prerequisites are checked in order: one still in `ArtifactCheck` makes
/// the action `NotReady` (it may not compile while a prerequisite's cache
/// lookup is pending, even if that lookup would hit), one in `Error` fails
/// it, and anything other than `Finished` makes it `NotReady`.
pub fn readiness(states: &[ActionState], action: &Action) -> Readiness {
    for &prerequisite in &action.prerequisites {
        let dep = &states[prerequisite];
        if dep.phase != ActionPhase::Compile {
            return Readiness::NotReady;
        }
        match dep.status {
            ActionStatus::Error => return Readiness::Failed(prerequisite),
            ActionStatus::Finished => {}
            ActionStatus::Queued | ActionStatus::Running => return Readiness::NotReady,
        }
    }
    Readiness::Ready
}

/// Aggregate status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn from_states(states: &[ActionState]) -> Self {
        let mut counts = Self::default();
        for state in states {
            match state.status {
                ActionStatus::Queued => counts.queued += 1,
                ActionStatus::Running => counts.running += 1,
                ActionStatus::Finished => counts.finished += 1,
                ActionStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.finished + self.error
    }
}

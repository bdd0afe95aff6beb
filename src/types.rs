// src/types.rs

use std::fmt;

/// Execution phase of an action.
///
/// - `ArtifactCheck`: try to reuse previously produced outputs.
/// - `Compile`: execute the action for real.
///
/// An action only ever moves forward from `ArtifactCheck` to `Compile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionPhase {
    ArtifactCheck,
    Compile,
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPhase::ArtifactCheck => f.write_str("artifact-check"),
            ActionPhase::Compile => f.write_str("compile"),
        }
    }
}

/// Scheduling status of an action.
///
/// Valid transitions are `Queued -> Running`, `Running -> Finished | Error`
/// and `Running -> Queued` (artifact-check miss only). The one exception is
/// a queued action whose prerequisite failed: it moves straight to `Error`
/// without ever being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    Queued,
    Running,
    Finished,
    Error,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Finished | ActionStatus::Error)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Queued => "queued",
            ActionStatus::Running => "running",
            ActionStatus::Finished => "finished",
            ActionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// How a runner receives work.
///
/// - `Automatic`: the scan loop offers every newly-ready action of the
///   runner's phase, subject to capacity.
/// - `Manual`: the runner's owner pulls work explicitly through
///   `Engine::try_start_one(Some(id))` / `Engine::start_many(Some(id))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerKind {
    #[default]
    Automatic,
    Manual,
}

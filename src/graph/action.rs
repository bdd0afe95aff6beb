// src/graph/action.rs

use std::path::PathBuf;

use crate::types::ActionPhase;

/// One schedulable unit of work (a compile, link or package step).
///
/// Actions are produced upstream and never mutated by the scheduler; all
/// mutable scheduling state lives in the engine's per-action state array.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Stable, dense index of this action inside its [`ActionGraph`].
    ///
    /// [`ActionGraph`]: crate::graph::ActionGraph
    pub index: usize,
    pub name: String,
    /// Human readable description used in reports and stall dumps.
    pub description: String,
    /// Shell command line; `None` for phony actions that only group
    /// prerequisites.
    pub command: Option<String>,
    /// Indices of actions that must finish before this one may run.
    pub prerequisites: Vec<usize>,
    /// Relative resource cost, counted against a runner's `max_weight`.
    pub weight: f64,
    /// Whether the action first goes through the artifact-check phase.
    pub artifact_check: bool,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl Action {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            index,
            description: name.clone(),
            name,
            command: None,
            prerequisites: Vec::new(),
            weight: 1.0,
            artifact_check: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: impl IntoIterator<Item = usize>) -> Self {
        self.prerequisites = prerequisites.into_iter().collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_artifact_check(mut self, enabled: bool) -> Self {
        self.artifact_check = enabled;
        self
    }

    /// Phase an action starts in before anything has happened to it.
    pub fn initial_phase(&self) -> ActionPhase {
        if self.artifact_check {
            ActionPhase::ArtifactCheck
        } else {
            ActionPhase::Compile
        }
    }
}

// src/engine/runner.rs

//! Runner abstraction: the only extension point for execution backends.

use std::fmt;
use std::sync::Arc;

use crate::engine::cancel::CancelToken;
use crate::engine::report::Job;
use crate::graph::Action;
use crate::types::{ActionPhase, RunnerKind};

/// Execution backend for one phase.
///
/// `try_run` is called with the engine lock held, so it must be cheap and
/// must not call back into the engine. Returning `None` declines the action
/// (e.g. no process slot available) and the engine tries the next runner.
pub trait Runner: Send + Sync {
    fn try_run(&self, action: &Action, cancel: &CancelToken) -> Option<Job>;
}

impl<F> Runner for F
where
    F: Fn(&Action, &CancelToken) -> Option<Job> + Send + Sync,
{
    fn try_run(&self, action: &Action, cancel: &CancelToken) -> Option<Job> {
        self(action, cancel)
    }
}

/// Handle returned by `Engine::add_runner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunnerId(pub(crate) usize);

impl RunnerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runner#{}", self.0)
    }
}

/// Static limits and routing for a registered runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub name: String,
    pub kind: RunnerKind,
    pub phase: ActionPhase,
    pub max_count: usize,
    pub max_weight: Option<f64>,
}

impl RunnerConfig {
    pub fn automatic(name: impl Into<String>, phase: ActionPhase, max_count: usize) -> Self {
        Self {
            name: name.into(),
            kind: RunnerKind::Automatic,
            phase,
            max_count,
            max_weight: None,
        }
    }

    pub fn manual(name: impl Into<String>, phase: ActionPhase, max_count: usize) -> Self {
        Self {
            kind: RunnerKind::Manual,
            ..Self::automatic(name, phase, max_count)
        }
    }

    pub fn with_max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = Some(max_weight);
        self
    }
}

/// Engine-side bookkeeping for one runner. Guarded by the engine lock.
pub(crate) struct RunnerSlot {
    pub config: RunnerConfig,
    pub runner: Arc<dyn Runner>,
    pub active_count: usize,
    pub active_weight: f64,
    /// Generation at which this runner last found nothing to dispatch.
    pub idle_generation: Option<u64>,
}

impl RunnerSlot {
    pub fn new(config: RunnerConfig, runner: Arc<dyn Runner>) -> Self {
        Self {
            config,
            runner,
            active_count: 0,
            active_weight: 0.0,
            idle_generation: None,
        }
    }

    pub fn is_under_limits(&self) -> bool {
        self.active_count < self.config.max_count
            && self
                .config
                .max_weight
                .is_none_or(|max| self.active_weight < max)
    }

    /// Whether an action of `weight` may start now.
    ///
    /// An idle runner always admits one action, even one heavier than the
    /// cap, otherwise such an action could never run.
    pub fn admits(&self, weight: f64) -> bool {
        if !self.is_under_limits() {
            return false;
        }
        match self.config.max_weight {
            Some(max) => self.active_count == 0 || self.active_weight + weight <= max,
            None => true,
        }
    }

    pub fn acquire(&mut self, weight: f64) {
        self.active_count += 1;
        self.active_weight += weight;
    }

    pub fn release(&mut self, weight: f64) {
        self.active_count = self.active_count.saturating_sub(1);
        self.active_weight = if self.active_count == 0 {
            0.0
        } else {
            (self.active_weight - weight).max(0.0)
        };
    }
}

// src/engine/scheduler.rs

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::engine::cancel::CancelToken;
use crate::engine::monitor::{self, MonitorHandle};
use crate::engine::options::EngineOptions;
use crate::engine::report::{ActionReport, ActionResult, Completion, Job, Reporter};
use crate::engine::rescan::RescanGate;
use crate::engine::runner::{Runner, RunnerConfig, RunnerId, RunnerSlot};
use crate::engine::snapshot::{EngineSnapshot, RunnerSnapshot, StallReport};
use crate::engine::state::{readiness, ActionState, Readiness, StatusCounts};
use crate::errors::{ActionGraphError, Result};
use crate::graph::{Action, ActionGraph};
use crate::types::{ActionPhase, ActionStatus, RunnerKind};

/// Scheduling engine for one action graph.
///
/// The engine owns all per-action state behind a single mutex. It computes
/// readiness, hands ready actions to registered runners, records
/// completions and signals once every action is terminal. Jobs run outside
/// the lock: on a fresh worker thread for automatic runners, or on the
/// calling thread for manual runners.
///
/// `Engine` is a cheap, cloneable handle. An instance is built for one
/// graph, driven to completion with [`run_until_done`](Self::run_until_done)
/// and then discarded.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

/// Non-owning handle used by the stall monitor.
#[derive(Clone)]
pub(crate) struct WeakEngine {
    shared: Weak<Shared>,
}

impl WeakEngine {
    pub fn upgrade(&self) -> Option<Engine> {
        self.shared.upgrade().map(|shared| Engine { shared })
    }
}

struct Shared {
    graph: ActionGraph,
    options: EngineOptions,
    reporter: Option<Arc<dyn Reporter>>,
    state: Mutex<State>,
    /// Notified once every action is terminal and every report delivered.
    done: Condvar,
    rescan: RescanGate,
    monitor: Mutex<Option<MonitorHandle>>,
}

struct State {
    actions: Vec<ActionState>,
    runners: Vec<RunnerSlot>,
    /// Every action before this index is terminal.
    first_pending: usize,
    completed: usize,
    /// Bumped on every state change.
    generation: u64,
    /// Generation at which a scan over automatic runners found nothing.
    auto_idle_generation: Option<u64>,
    done_signaled: bool,
    /// Terminal reports collected under the lock but not yet delivered.
    undelivered: usize,
}

impl State {
    fn is_settled(&self) -> bool {
        self.done_signaled && self.undelivered == 0
    }
}

struct Dispatch {
    index: usize,
    kind: RunnerKind,
    runner_name: String,
    job: Job,
}

#[derive(Default)]
struct ScanOutcome {
    dispatch: Option<Dispatch>,
    reports: Vec<ActionReport>,
    /// Some action was resolved without being dispatched.
    resolved: bool,
}

struct StepOutcome {
    dispatched: bool,
    progressed: bool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("actions", &self.shared.graph.len())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(graph: ActionGraph, options: EngineOptions) -> Self {
        Self::build(graph, options, None)
    }

    pub fn with_reporter(
        graph: ActionGraph,
        options: EngineOptions,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self::build(graph, options, Some(reporter))
    }

    fn build(
        graph: ActionGraph,
        options: EngineOptions,
        reporter: Option<Arc<dyn Reporter>>,
    ) -> Self {
        let actions: Vec<ActionState> = graph.actions().iter().map(ActionState::new).collect();
        let state = State {
            done_signaled: actions.is_empty(),
            actions,
            runners: Vec::new(),
            first_pending: 0,
            completed: 0,
            generation: 0,
            auto_idle_generation: None,
            undelivered: 0,
        };

        Self {
            shared: Arc::new(Shared {
                graph,
                options,
                reporter,
                state: Mutex::new(state),
                done: Condvar::new(),
                rescan: RescanGate::new(),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.shared.graph
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.options.cancel.clone()
    }

    /// Register an execution backend. Register runners before starting work:
    /// a scan that finds no runner able to make progress fails the run.
    pub fn add_runner(&self, config: RunnerConfig, runner: Arc<dyn Runner>) -> RunnerId {
        let mut state = self.lock_state();
        let id = RunnerId(state.runners.len());
        debug!(
            runner = %config.name,
            kind = ?config.kind,
            phase = %config.phase,
            max_count = config.max_count,
            max_weight = ?config.max_weight,
            "engine: registered runner"
        );
        state.runners.push(RunnerSlot::new(config, runner));
        state.generation += 1;
        id
    }

    /// Begin background stall/telemetry sampling, if configured.
    pub fn start(&self) {
        let Some(options) = self.shared.options.stall else {
            return;
        };

        let mut slot = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        match monitor::spawn(self.downgrade(), options) {
            Ok(handle) => *slot = Some(handle),
            Err(err) => warn!(error = %err, "failed to start stall monitor thread"),
        }
    }

    /// Try to dispatch exactly one newly-ready action.
    ///
    /// With `Some(runner)` only that runner is considered (manual pull) and
    /// its job runs synchronously on the calling thread before this returns.
    /// With `None`, any under-limit automatic runner of the action's phase
    /// may take it. Returns `false` if nothing could be started.
    pub fn try_start_one(&self, runner: Option<RunnerId>) -> bool {
        self.step(runner).dispatched
    }

    /// Dispatch until nothing more can be started.
    ///
    /// Without an explicit runner, concurrent callers coalesce: only one
    /// thread walks the action list at a time and late requests turn into a
    /// single follow-up walk.
    pub fn start_many(&self, runner: Option<RunnerId>) {
        match runner {
            Some(id) => while self.step(Some(id)).progressed {},
            None => self.shared.rescan.run(|| while self.step(None).progressed {}),
        }
    }

    /// Block until every action is terminal. Returns `false` if any action
    /// ended in `Error`.
    pub fn run_until_done(&self) -> bool {
        let started = Instant::now();
        info!(actions = self.shared.graph.len(), "engine: run started");

        self.start_many(None);

        let success = {
            let mut state = self.lock_state();
            while !state.is_settled() {
                state = self
                    .shared
                    .done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state
                .actions
                .iter()
                .all(|a| a.status == ActionStatus::Finished)
        };

        self.stop_monitor();

        info!(
            success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine: run finished"
        );
        success
    }

    /// Backend callback: a dispatched action finished.
    pub fn on_action_completed(
        &self,
        index: usize,
        success: bool,
        result: ActionResult,
    ) -> Result<()> {
        let status = if success {
            ActionStatus::Finished
        } else {
            ActionStatus::Error
        };
        self.complete(index, status, Some(result))?;
        self.start_many(None);
        Ok(())
    }

    /// Backend callback: the artifact check for a running action missed.
    ///
    /// The action moves to phase `Compile`, status `Queued`. Only valid while
    /// the action is running its artifact check.
    pub fn requeue(&self, index: usize) -> Result<()> {
        self.complete(index, ActionStatus::Queued, None)?;
        self.start_many(None);
        Ok(())
    }

    /// Tell the engine that a runner which declined work may now accept it.
    pub fn notify_runner_available(&self) {
        self.lock_state().generation += 1;
        self.start_many(None);
    }

    /// Cancel the run: in-flight work finishes, everything that becomes
    /// ready afterwards is recorded as canceled.
    pub fn cancel(&self) {
        info!("engine: cancellation requested");
        self.shared.options.cancel.cancel();
        self.lock_state().generation += 1;
        self.start_many(None);
    }

    /// Every action is terminal and every report has been delivered.
    pub fn is_done(&self) -> bool {
        self.lock_state().is_settled()
    }

    pub fn status_of(&self, index: usize) -> Option<(ActionStatus, ActionPhase)> {
        let state = self.lock_state();
        state.actions.get(index).map(|a| (a.status, a.phase))
    }

    pub fn result_of(&self, index: usize) -> Option<ActionResult> {
        let state = self.lock_state();
        state.actions.get(index).and_then(|a| a.result.clone())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.lock_state();

        let mut runners: Vec<RunnerSnapshot> = state
            .runners
            .iter()
            .enumerate()
            .map(|(i, slot)| RunnerSnapshot {
                id: RunnerId(i),
                name: slot.config.name.clone(),
                kind: slot.config.kind,
                phase: slot.config.phase,
                active_count: slot.active_count,
                max_count: slot.config.max_count,
                active_weight: slot.active_weight,
                max_weight: slot.config.max_weight,
                running: Vec::new(),
            })
            .collect();

        for (index, action) in state.actions.iter().enumerate() {
            if let (ActionStatus::Running, Some(id)) = (action.status, action.assigned_runner) {
                if let Some(runner) = runners.get_mut(id.0) {
                    runner
                        .running
                        .push(self.shared.graph.actions()[index].description.clone());
                }
            }
        }

        EngineSnapshot {
            generation: state.generation,
            counts: StatusCounts::from_states(&state.actions),
            runners,
            actions: state.actions.iter().map(|a| (a.status, a.phase)).collect(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn report_stall(&self, report: &StallReport) {
        if let Some(ref reporter) = self.shared.reporter {
            reporter.on_stall(report);
        }
    }

    /// Fail every queued action. Returns how many were failed.
    pub(crate) fn force_fail_remaining(&self, reason: &str) -> usize {
        let reports = {
            let mut state = self.lock_state();
            self.fail_queued(&mut state, reason)
        };
        self.deliver(&reports);
        reports.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_monitor(&self) {
        let handle = self
            .shared
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    fn step(&self, runner: Option<RunnerId>) -> StepOutcome {
        let outcome = {
            let mut state = self.lock_state();
            self.scan(&mut state, runner)
        };

        self.deliver(&outcome.reports);

        let dispatched = outcome.dispatch.is_some();
        if let Some(dispatch) = outcome.dispatch {
            self.launch(dispatch);
        }

        StepOutcome {
            dispatched,
            progressed: dispatched || outcome.resolved,
        }
    }

    /// Walk queued actions from the cursor and dispatch the first ready one.
    ///
    /// Actions whose prerequisites failed (or that become ready after
    /// cancellation) are resolved to `Error` along the way, all in this one
    /// pass.
    fn scan(&self, state: &mut State, only: Option<RunnerId>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let cancelled = self.shared.options.cancel.is_cancelled();

        let idle_generation = match only {
            Some(id) => match state.runners.get(id.0) {
                Some(slot) => slot.idle_generation,
                None => {
                    warn!(runner = %id, "dispatch requested for unknown runner; ignoring");
                    return outcome;
                }
            },
            None => state.auto_idle_generation,
        };
        if !cancelled && idle_generation == Some(state.generation) {
            return outcome;
        }

        let len = state.actions.len();
        while state.first_pending < len && state.actions[state.first_pending].status.is_terminal()
        {
            state.first_pending += 1;
        }

        let graph = &self.shared.graph;
        let mut resolved = 0usize;

        for index in state.first_pending..len {
            if state.actions[index].status != ActionStatus::Queued {
                continue;
            }
            let action = &graph.actions()[index];

            let result = match readiness(&state.actions, action) {
                Readiness::NotReady => continue,
                Readiness::Failed(prerequisite) => {
                    let dep = &graph.actions()[prerequisite].name;
                    debug!(
                        action = %action.name,
                        prerequisite = %dep,
                        "prerequisite failed; failing action without dispatch"
                    );
                    ActionResult::failed(None, format!("prerequisite '{dep}' failed"))
                }
                Readiness::Ready if cancelled => {
                    debug!(action = %action.name, "run cancelled; not dispatching ready action");
                    ActionResult::canceled()
                }
                Readiness::Ready => {
                    let phase = state.actions[index].phase;
                    let Some((id, job)) = self.pick_runner(state, action, phase, only) else {
                        continue;
                    };

                    let slot = &mut state.runners[id.0];
                    slot.acquire(action.weight);
                    let kind = slot.config.kind;
                    let runner_name = slot.config.name.clone();

                    let st = &mut state.actions[index];
                    st.status = ActionStatus::Running;
                    st.assigned_runner = Some(id);

                    debug!(
                        action = %action.name,
                        phase = %phase,
                        runner = %runner_name,
                        "dispatching action"
                    );

                    state.generation += 1;
                    self.record_terminal(state, resolved);
                    outcome.resolved = resolved > 0;
                    outcome.dispatch = Some(Dispatch {
                        index,
                        kind,
                        runner_name,
                        job,
                    });
                    return outcome;
                }
            };

            let st = &mut state.actions[index];
            st.status = ActionStatus::Error;
            st.phase = ActionPhase::Compile;
            st.result = Some(result);
            outcome.reports.push(self.report_for(state, index));
            resolved += 1;
        }

        if resolved > 0 {
            state.generation += 1;
            self.record_terminal(state, resolved);
            outcome.resolved = true;
            return outcome;
        }

        if only.is_none() && Self::is_starved(state) {
            warn!(
                remaining = state.actions.len() - state.completed,
                "no action is running and no runner can start any queued action; failing the rest"
            );
            outcome.reports = self.fail_queued(
                state,
                "starved: no runner can make progress (unresolvable or cyclic prerequisites?)",
            );
            outcome.resolved = !outcome.reports.is_empty();
            return outcome;
        }

        let generation = state.generation;
        match only {
            Some(id) => state.runners[id.0].idle_generation = Some(generation),
            None => state.auto_idle_generation = Some(generation),
        }
        outcome
    }

    /// First candidate runner that is under its limits and accepts the action.
    fn pick_runner(
        &self,
        state: &State,
        action: &Action,
        phase: ActionPhase,
        only: Option<RunnerId>,
    ) -> Option<(RunnerId, Job)> {
        let cancel = &self.shared.options.cancel;

        for (i, slot) in state.runners.iter().enumerate() {
            let candidate = match only {
                Some(id) => id.0 == i,
                None => slot.config.kind == RunnerKind::Automatic,
            };
            if !candidate || slot.config.phase != phase || !slot.admits(action.weight) {
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| slot.runner.try_run(action, cancel))) {
                Ok(Some(job)) => return Some((RunnerId(i), job)),
                Ok(None) => {
                    debug!(action = %action.name, runner = %slot.config.name, "runner declined action");
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        action = %action.name,
                        runner = %slot.config.name,
                        %message,
                        "runner panicked while accepting action; recording failure"
                    );
                    let job: Job = Box::new(move |_| {
                        Completion::Failed(ActionResult::failed(
                            None,
                            format!("runner panicked: {message}"),
                        ))
                    });
                    return Some((RunnerId(i), job));
                }
            }
        }

        None
    }

    fn is_starved(state: &State) -> bool {
        let any_queued = state.actions[state.first_pending..]
            .iter()
            .any(|a| a.status == ActionStatus::Queued);
        let any_active = state.runners.iter().any(|r| r.active_count > 0);
        let any_manual = state
            .runners
            .iter()
            .any(|r| r.config.kind == RunnerKind::Manual);

        any_queued && !any_active && !any_manual
    }

    fn launch(&self, dispatch: Dispatch) {
        let Dispatch {
            index,
            kind,
            runner_name,
            job,
        } = dispatch;

        match kind {
            RunnerKind::Manual => self.execute(index, job),
            RunnerKind::Automatic => {
                let engine = self.clone();
                let spawned = thread::Builder::new()
                    .name(format!("actiongraph-{runner_name}"))
                    .spawn(move || engine.execute(index, job));

                if let Err(err) = spawned {
                    error!(action = index, error = %err, "failed to spawn worker thread");
                    self.finish(
                        index,
                        Completion::Failed(ActionResult::failed(
                            None,
                            format!("failed to spawn worker thread: {err}"),
                        )),
                    );
                }
            }
        }
    }

    /// Run a job and record its completion. Panics become failures.
    fn execute(&self, index: usize, job: Job) {
        let started = Instant::now();
        let cancel = self.shared.options.cancel.clone();

        let completion = match panic::catch_unwind(AssertUnwindSafe(move || job(&cancel))) {
            Ok(completion) => completion,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(action = index, %message, "job panicked; recording failure");
                Completion::Failed(
                    ActionResult::failed(None, format!("job panicked: {message}"))
                        .with_duration(started.elapsed()),
                )
            }
        };

        self.finish(index, completion);
    }

    fn finish(&self, index: usize, completion: Completion) {
        let (status, result) = match completion {
            Completion::Finished(result) => (ActionStatus::Finished, Some(result)),
            Completion::Failed(result) => (ActionStatus::Error, Some(result)),
            Completion::Requeue => (ActionStatus::Queued, None),
        };

        match self.complete(index, status, result) {
            Ok(()) => {}
            Err(ActionGraphError::InvalidTransition {
                to: ActionStatus::Queued,
                ..
            }) => {
                error!(action = index, "job requested requeue outside the artifact-check phase");
                let result =
                    ActionResult::failed(None, "requeue requested outside the artifact-check phase");
                if let Err(err) = self.complete(index, ActionStatus::Error, Some(result)) {
                    error!(action = index, error = %err, "dropping completion");
                }
            }
            Err(err) => error!(action = index, error = %err, "dropping completion"),
        }

        self.start_many(None);
    }

    /// Apply a reported completion to a running action.
    fn complete(
        &self,
        index: usize,
        status: ActionStatus,
        result: Option<ActionResult>,
    ) -> Result<()> {
        let action = self
            .shared
            .graph
            .get(index)
            .ok_or(ActionGraphError::ActionNotFound(index))?;

        let reports = {
            let mut state = self.lock_state();

            let current = &state.actions[index];
            let invalid = current.status != ActionStatus::Running
                || status == ActionStatus::Running
                || (status == ActionStatus::Queued && current.phase != ActionPhase::ArtifactCheck);
            if invalid {
                return Err(ActionGraphError::InvalidTransition {
                    action: index,
                    from: current.status,
                    to: status,
                });
            }

            let st = &mut state.actions[index];
            let previous_phase = st.phase;
            let mut status = status;
            if st.phase == ActionPhase::ArtifactCheck {
                // A miss and a failed check both fall through to compilation.
                st.phase = ActionPhase::Compile;
                if status != ActionStatus::Finished {
                    status = ActionStatus::Queued;
                }
            }
            let runner = st.assigned_runner.take();
            st.status = status;
            if let Some(result) = result {
                st.result = Some(result);
            }

            if let Some(id) = runner {
                state.runners[id.0].release(action.weight);
            }
            state.generation += 1;

            debug!(
                action = %action.name,
                phase = %previous_phase,
                status = %status,
                "action completed"
            );

            let mut reports = Vec::new();
            if status.is_terminal() {
                reports.push(self.report_for(&state, index));
                self.record_terminal(&mut state, 1);

                if status == ActionStatus::Error {
                    warn!(action = %action.name, "action failed");
                    let cancel = &self.shared.options.cancel;
                    if self.shared.options.stop_on_error && !cancel.is_cancelled() {
                        info!("stop_on_error set; cancelling remaining actions");
                        cancel.cancel();
                    }
                }
            }
            reports
        };

        self.deliver(&reports);
        Ok(())
    }

    fn fail_queued(&self, state: &mut State, reason: &str) -> Vec<ActionReport> {
        let mut reports = Vec::new();
        for index in state.first_pending..state.actions.len() {
            let st = &mut state.actions[index];
            if st.status != ActionStatus::Queued {
                continue;
            }
            st.status = ActionStatus::Error;
            st.phase = ActionPhase::Compile;
            st.result = Some(ActionResult::failed(None, reason));
            reports.push(self.report_for(state, index));
        }

        if !reports.is_empty() {
            state.generation += 1;
            self.record_terminal(state, reports.len());
        }
        reports
    }

    fn record_terminal(&self, state: &mut State, count: usize) {
        if count == 0 {
            return;
        }
        state.completed += count;
        state.undelivered += count;
        debug_assert!(state.completed <= state.actions.len());

        // Waiters are woken by `deliver` once the final reports are out.
        if !state.done_signaled && state.completed == state.actions.len() {
            state.done_signaled = true;
            debug!(actions = state.actions.len(), "all actions terminal");
        }
    }

    fn report_for(&self, state: &State, index: usize) -> ActionReport {
        let action = &self.shared.graph.actions()[index];
        let st = &state.actions[index];
        ActionReport {
            index,
            name: action.name.clone(),
            description: action.description.clone(),
            status: st.status,
            result: st.result.clone(),
        }
    }

    fn deliver(&self, reports: &[ActionReport]) {
        if reports.is_empty() {
            return;
        }
        if let Some(ref reporter) = self.shared.reporter {
            for report in reports {
                reporter.on_action_terminal(report);
            }
        }

        let mut state = self.lock_state();
        state.undelivered = state.undelivered.saturating_sub(reports.len());
        if state.is_settled() {
            self.shared.done.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

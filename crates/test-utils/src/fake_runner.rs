//! In-memory runners for engine tests.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use actiongraph::engine::{ActionResult, CancelToken, Completion, Job, Runner};
use actiongraph::graph::Action;

/// One entry in a [`Timeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started(String),
    Completed(String),
}

/// Ordered log of job events, shareable between runners so that the
/// relative order of work across phases can be checked.
#[derive(Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Position of the first occurrence of `event`.
    pub fn position(&self, event: &JobEvent) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    fn push(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct Recorder {
    started: Vec<String>,
    running: usize,
    max_running: usize,
    running_weight: f64,
    max_running_weight: f64,
}

/// A fake runner that:
/// - records the order in which actions started
/// - tracks the peak number (and weight) of concurrently running jobs
/// - optionally sleeps in each job, and fails a configured set of names
/// - logs each job's start and completion to its [`Timeline`].
#[derive(Clone, Default)]
pub struct RecordingRunner {
    recorder: Arc<Mutex<Recorder>>,
    timeline: Timeline,
    failing: Arc<HashSet<String>>,
    delay: Duration,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failing = Arc::new(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.recorder.lock().unwrap().started.clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.recorder.lock().unwrap().max_running
    }

    pub fn max_concurrent_weight(&self) -> f64 {
        self.recorder.lock().unwrap().max_running_weight
    }

    /// Position of `name` in the start order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.started().iter().position(|n| n == name)
    }
}

impl Runner for RecordingRunner {
    fn try_run(&self, action: &Action, _cancel: &CancelToken) -> Option<Job> {
        let recorder = Arc::clone(&self.recorder);
        let timeline = self.timeline.clone();
        let fail = self.failing.contains(&action.name);
        let delay = self.delay;
        let name = action.name.clone();
        let weight = action.weight;

        Some(Box::new(move |_cancel: &CancelToken| {
            timeline.push(JobEvent::Started(name.clone()));
            {
                let mut r = recorder.lock().unwrap();
                r.started.push(name.clone());
                r.running += 1;
                r.running_weight += weight;
                r.max_running = r.max_running.max(r.running);
                r.max_running_weight = r.max_running_weight.max(r.running_weight);
            }

            if !delay.is_zero() {
                thread::sleep(delay);
            }

            {
                let mut r = recorder.lock().unwrap();
                r.running -= 1;
                r.running_weight -= weight;
            }
            timeline.push(JobEvent::Completed(name.clone()));

            if fail {
                Completion::Failed(ActionResult::failed(Some(1), format!("{name} failed")))
            } else {
                Completion::Finished(ActionResult::success(format!("{name} ok")))
            }
        }))
    }
}

#[derive(Default)]
struct Gates {
    started: Vec<String>,
    released: HashSet<String>,
}

/// A runner whose jobs block until the test releases them by name.
///
/// A blocked job also returns once the run is cancelled, reporting a
/// canceled result.
#[derive(Clone, Default)]
pub struct GatedRunner {
    gates: Arc<(Mutex<Gates>, Condvar)>,
    miss: bool,
}

impl GatedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// An artifact-check runner whose released jobs report a cache miss.
    pub fn missing() -> Self {
        Self {
            miss: true,
            ..Self::default()
        }
    }

    pub fn release(&self, name: &str) {
        let (lock, cvar) = &*self.gates;
        lock.lock().unwrap().released.insert(name.to_string());
        cvar.notify_all();
    }

    pub fn started(&self) -> Vec<String> {
        self.gates.0.lock().unwrap().started.clone()
    }

    /// Wait until `name` has started; `false` on timeout.
    pub fn wait_started(&self, name: &str, limit: Duration) -> bool {
        self.wait_until(limit, |g| g.started.iter().any(|n| n == name))
    }

    /// Wait until `count` jobs have started; `false` on timeout.
    pub fn wait_started_count(&self, count: usize, limit: Duration) -> bool {
        self.wait_until(limit, |g| g.started.len() >= count)
    }

    fn wait_until(&self, limit: Duration, done: impl Fn(&Gates) -> bool) -> bool {
        let deadline = Instant::now() + limit;
        let (lock, cvar) = &*self.gates;
        let mut gates = lock.lock().unwrap();
        while !done(&gates) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            gates = cvar.wait_timeout(gates, deadline - now).unwrap().0;
        }
        true
    }
}

impl Runner for GatedRunner {
    fn try_run(&self, action: &Action, _cancel: &CancelToken) -> Option<Job> {
        let gates = Arc::clone(&self.gates);
        let name = action.name.clone();
        let miss = self.miss;

        Some(Box::new(move |cancel: &CancelToken| {
            let (lock, cvar) = &*gates;
            let mut g = lock.lock().unwrap();
            g.started.push(name.clone());
            cvar.notify_all();

            while !g.released.contains(&name) {
                if cancel.is_cancelled() {
                    return Completion::Failed(ActionResult::canceled());
                }
                g = cvar.wait_timeout(g, Duration::from_millis(10)).unwrap().0;
            }
            if miss {
                Completion::Requeue
            } else {
                Completion::Finished(ActionResult::success(format!("{name} released")))
            }
        }))
    }
}

/// Artifact-check runner that hits for a fixed set of names and misses for
/// everything else.
#[derive(Clone, Default)]
pub struct ScriptedCache {
    hits: Arc<HashSet<String>>,
    checked: Arc<Mutex<Vec<String>>>,
    timeline: Timeline,
}

impl ScriptedCache {
    pub fn hitting(names: &[&str]) -> Self {
        Self {
            hits: Arc::new(names.iter().map(|s| s.to_string()).collect()),
            checked: Arc::default(),
            timeline: Timeline::default(),
        }
    }

    /// Log checks to `timeline`; only a hit is logged as a completion,
    /// since a miss leaves the action for the compile runner.
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

impl Runner for ScriptedCache {
    fn try_run(&self, action: &Action, _cancel: &CancelToken) -> Option<Job> {
        let hit = self.hits.contains(&action.name);
        let checked = Arc::clone(&self.checked);
        let name = action.name.clone();
        let timeline = self.timeline.clone();

        Some(Box::new(move |_cancel: &CancelToken| {
            checked.lock().unwrap().push(name.clone());
            if hit {
                timeline.push(JobEvent::Completed(name));
                Completion::Finished(ActionResult::success("artifact cache hit"))
            } else {
                Completion::Requeue
            }
        }))
    }
}

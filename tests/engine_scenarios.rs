use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use actiongraph::engine::{Engine, EngineOptions, RunnerConfig};
use actiongraph::types::{ActionPhase, ActionStatus};
use actiongraph_test_utils::builders::GraphBuilder;
use actiongraph_test_utils::fake_runner::{GatedRunner, RecordingRunner, ScriptedCache};
use actiongraph_test_utils::{init_tracing, run_with_deadline};

const DEADLINE: Duration = Duration::from_secs(10);

#[test]
fn chain_runs_in_dependency_order() {
    init_tracing();

    let graph = GraphBuilder::new()
        .action("a", &[])
        .action("b", &["a"])
        .action("c", &["b"])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let runner = RecordingRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 1),
        Arc::new(runner.clone()),
    );

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(runner.started(), vec!["a", "b", "c"]);
    for i in 0..3 {
        assert_eq!(
            engine.status_of(i),
            Some((ActionStatus::Finished, ActionPhase::Compile))
        );
    }
    assert!(engine.is_done());
}

#[test]
fn failed_prerequisite_fails_dependent_without_dispatch() {
    init_tracing();

    let graph = GraphBuilder::new()
        .action("a", &[])
        .action("b", &["a"])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let runner = RecordingRunner::new().failing(&["a"]);
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 4),
        Arc::new(runner.clone()),
    );

    assert!(!run_with_deadline(&engine, DEADLINE));
    assert_eq!(runner.started(), vec!["a"]);
    assert_eq!(engine.status_of(0).map(|s| s.0), Some(ActionStatus::Error));
    assert_eq!(engine.status_of(1).map(|s| s.0), Some(ActionStatus::Error));

    let a = engine.result_of(0).expect("a has a result");
    assert_eq!(a.exit_code, Some(1));
    let b = engine.result_of(1).expect("b has a result");
    assert!(b.output.contains("prerequisite 'a' failed"), "got {:?}", b.output);
    assert!(!b.canceled);
}

#[test]
fn artifact_miss_requeues_to_compile_exactly_once() {
    init_tracing();

    let graph = GraphBuilder::new().cached("obj", &[]).build();
    assert_eq!(graph.actions()[0].initial_phase(), ActionPhase::ArtifactCheck);

    let engine = Engine::new(graph, EngineOptions::default());
    let cache = ScriptedCache::hitting(&[]);
    let compile = RecordingRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("cache", ActionPhase::ArtifactCheck, 4),
        Arc::new(cache.clone()),
    );
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 4),
        Arc::new(compile.clone()),
    );

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(cache.checked(), vec!["obj"]);
    assert_eq!(compile.started(), vec!["obj"]);
    assert_eq!(
        engine.status_of(0),
        Some((ActionStatus::Finished, ActionPhase::Compile))
    );
}

#[test]
fn artifact_miss_passes_back_through_queued_before_compiling() {
    init_tracing();

    let graph = GraphBuilder::new().cached("obj", &[]).build();
    let engine = Engine::new(graph, EngineOptions::default());
    let cache = GatedRunner::missing();
    let compile = RecordingRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("cache", ActionPhase::ArtifactCheck, 1),
        Arc::new(cache.clone()),
    );
    // Manual, so the requeued action stays queued until it is pulled.
    let compile_id = engine.add_runner(
        RunnerConfig::manual("compile", ActionPhase::Compile, 1),
        Arc::new(compile.clone()),
    );

    assert_eq!(
        engine.status_of(0),
        Some((ActionStatus::Queued, ActionPhase::ArtifactCheck))
    );

    engine.start_many(None);
    assert!(cache.wait_started("obj", DEADLINE));
    assert_eq!(
        engine.status_of(0),
        Some((ActionStatus::Running, ActionPhase::ArtifactCheck))
    );

    cache.release("obj");
    let deadline = Instant::now() + DEADLINE;
    while engine.status_of(0) != Some((ActionStatus::Queued, ActionPhase::Compile)) {
        assert!(Instant::now() < deadline, "miss was not requeued: {:?}", engine.status_of(0));
        thread::sleep(Duration::from_millis(5));
    }
    assert!(compile.started().is_empty());

    assert!(engine.try_start_one(Some(compile_id)));
    assert_eq!(compile.started(), vec!["obj"]);
    assert_eq!(
        engine.status_of(0),
        Some((ActionStatus::Finished, ActionPhase::Compile))
    );
    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(cache.started(), vec!["obj"]);
}

#[test]
fn artifact_hit_skips_compile() {
    init_tracing();

    let graph = GraphBuilder::new()
        .cached("lib", &[])
        .action("app", &["lib"])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let cache = ScriptedCache::hitting(&["lib"]);
    let compile = RecordingRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("cache", ActionPhase::ArtifactCheck, 4),
        Arc::new(cache.clone()),
    );
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 4),
        Arc::new(compile.clone()),
    );

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(cache.checked(), vec!["lib"]);
    assert_eq!(compile.started(), vec!["app"]);
    let lib = engine.result_of(0).expect("lib has a result");
    assert_eq!(lib.output, "artifact cache hit");
}

#[test]
fn ready_action_waits_for_capacity_then_starts_unprompted() {
    init_tracing();

    let graph = GraphBuilder::new()
        .action("a", &[])
        .action("b", &[])
        .action("c", &[])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let gated = GatedRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("left", ActionPhase::Compile, 1),
        Arc::new(gated.clone()),
    );
    engine.add_runner(
        RunnerConfig::automatic("right", ActionPhase::Compile, 1),
        Arc::new(gated.clone()),
    );

    engine.start_many(None);
    assert!(gated.wait_started_count(2, DEADLINE));
    assert!(!engine.try_start_one(None));
    assert_eq!(engine.status_of(2).map(|s| s.0), Some(ActionStatus::Queued));

    gated.release("a");
    assert!(gated.wait_started("c", DEADLINE));

    gated.release("b");
    gated.release("c");
    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(gated.started().len(), 3);
}

#[test]
fn manual_runner_only_receives_pulled_work() {
    init_tracing();

    let graph = GraphBuilder::new()
        .action("a", &[])
        .action("b", &["a"])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let runner = RecordingRunner::new();
    let id = engine.add_runner(
        RunnerConfig::manual("remote-worker", ActionPhase::Compile, 1),
        Arc::new(runner.clone()),
    );

    // Automatic dispatch never offers work to a manual runner.
    engine.start_many(None);
    assert!(runner.started().is_empty());
    assert!(!engine.is_done());

    // Manual jobs run synchronously on the pulling thread.
    assert!(engine.try_start_one(Some(id)));
    assert_eq!(
        engine.status_of(0),
        Some((ActionStatus::Finished, ActionPhase::Compile))
    );

    engine.start_many(Some(id));
    assert_eq!(runner.started(), vec!["a", "b"]);
    assert!(engine.is_done());
    assert!(run_with_deadline(&engine, DEADLINE));
}

#[test]
fn runner_declining_work_is_retried_after_nudge() {
    use std::sync::atomic::{AtomicBool, Ordering};

    use actiongraph::engine::{ActionResult, CancelToken, Completion, Job};
    use actiongraph::graph::Action;

    init_tracing();

    let graph = GraphBuilder::new().action("a", &[]).action("b", &[]).build();
    let engine = Engine::new(graph, EngineOptions::default());

    // Accepts "a" immediately; declines everything else until opened.
    let open = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&open);
    let gated = GatedRunner::new();
    let inner = gated.clone();
    engine.add_runner(
        RunnerConfig::automatic("pool", ActionPhase::Compile, 4),
        Arc::new(move |action: &Action, cancel: &CancelToken| -> Option<Job> {
            if action.name == "a" {
                return actiongraph::engine::Runner::try_run(&inner, action, cancel);
            }
            if !gate.load(Ordering::SeqCst) {
                return None;
            }
            Some(Box::new(|_: &CancelToken| {
                Completion::Finished(ActionResult::success("late"))
            }))
        }),
    );

    engine.start_many(None);
    assert!(gated.wait_started("a", DEADLINE));
    assert_eq!(engine.status_of(1).map(|s| s.0), Some(ActionStatus::Queued));

    open.store(true, Ordering::SeqCst);
    engine.notify_runner_available();
    gated.release("a");

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(engine.result_of(1).map(|r| r.output), Some("late".to_string()));
}

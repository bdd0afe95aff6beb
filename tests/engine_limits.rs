use std::sync::Arc;
use std::time::Duration;

use actiongraph::engine::{Engine, EngineOptions, RunnerConfig};
use actiongraph::types::{ActionPhase, ActionStatus};
use actiongraph_test_utils::builders::GraphBuilder;
use actiongraph_test_utils::fake_runner::{GatedRunner, RecordingRunner};
use actiongraph_test_utils::{init_tracing, run_with_deadline};

const DEADLINE: Duration = Duration::from_secs(10);

#[test]
fn max_count_bounds_concurrency() {
    init_tracing();

    let mut builder = GraphBuilder::new();
    for i in 0..12 {
        builder = builder.action(&format!("t{i}"), &[]);
    }
    let engine = Engine::new(builder.build(), EngineOptions::default());
    let runner = RecordingRunner::new().with_delay(Duration::from_millis(20));
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 3),
        Arc::new(runner.clone()),
    );

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(runner.started().len(), 12);
    assert!(runner.max_concurrent() <= 3, "peak {}", runner.max_concurrent());
}

#[test]
fn max_weight_bounds_summed_weight() {
    init_tracing();

    let mut builder = GraphBuilder::new();
    for i in 0..8 {
        builder = builder.weighted(&format!("heavy{i}"), &[], 2.0);
    }
    let engine = Engine::new(builder.build(), EngineOptions::default());
    let runner = RecordingRunner::new().with_delay(Duration::from_millis(20));
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 16).with_max_weight(4.0),
        Arc::new(runner.clone()),
    );

    assert!(run_with_deadline(&engine, DEADLINE));
    assert_eq!(runner.started().len(), 8);
    assert!(runner.max_concurrent() <= 2, "peak {}", runner.max_concurrent());
    assert!(
        runner.max_concurrent_weight() <= 4.0,
        "peak weight {}",
        runner.max_concurrent_weight()
    );
}

#[test]
fn overweight_action_still_runs_alone() {
    init_tracing();

    let graph = GraphBuilder::new()
        .weighted("giant", &[], 10.0)
        .weighted("small", &[], 1.0)
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let gated = GatedRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 4).with_max_weight(4.0),
        Arc::new(gated.clone()),
    );

    engine.start_many(None);
    assert!(gated.wait_started("giant", DEADLINE));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.runners[0].active_count, 1);
    assert_eq!(snapshot.runners[0].active_weight, 10.0);
    assert_eq!(engine.status_of(1).map(|s| s.0), Some(ActionStatus::Queued));

    gated.release("giant");
    assert!(gated.wait_started("small", DEADLINE));
    gated.release("small");

    assert!(run_with_deadline(&engine, DEADLINE));
}

#[test]
fn snapshot_reports_running_descriptions_per_runner() {
    init_tracing();

    let graph = GraphBuilder::new()
        .add("obj", &[], |a| a.with_description("Compile obj.c"))
        .action("link", &["obj"])
        .build();
    let engine = Engine::new(graph, EngineOptions::default());
    let gated = GatedRunner::new();
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 2),
        Arc::new(gated.clone()),
    );

    engine.start_many(None);
    assert!(gated.wait_started("obj", DEADLINE));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.running, 1);
    assert_eq!(snapshot.counts.queued, 1);
    assert_eq!(snapshot.runners[0].name, "compile");
    assert_eq!(snapshot.runners[0].running, vec!["Compile obj.c".to_string()]);

    gated.release("obj");
    gated.release("link");
    assert!(run_with_deadline(&engine, DEADLINE));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.counts.finished, 2);
    assert_eq!(snapshot.runners[0].active_count, 0);
    assert_eq!(snapshot.runners[0].active_weight, 0.0);
}

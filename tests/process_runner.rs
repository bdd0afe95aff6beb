#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use actiongraph::engine::{Engine, EngineOptions, RunnerConfig};
use actiongraph::exec::{CacheRunner, FingerprintStore, ProcessRunner};
use actiongraph::graph::{Action, ActionGraph};
use actiongraph::types::{ActionPhase, ActionStatus};
use actiongraph_test_utils::{init_tracing, with_timeout};

fn engine_for(graph: ActionGraph, root: &Path, store: Option<Arc<FingerprintStore>>) -> Engine {
    let engine = Engine::new(graph, EngineOptions::default());
    let mut process = ProcessRunner::new(Handle::current(), root);
    if let Some(ref store) = store {
        process = process.with_fingerprints(Arc::clone(store));
        engine.add_runner(
            RunnerConfig::automatic("cache", ActionPhase::ArtifactCheck, 2),
            Arc::new(CacheRunner::new(Arc::clone(store))),
        );
    }
    engine.add_runner(
        RunnerConfig::automatic("compile", ActionPhase::Compile, 2),
        Arc::new(process),
    );
    engine
}

async fn run(engine: &Engine) -> bool {
    let engine = engine.clone();
    with_timeout(tokio::task::spawn_blocking(move || engine.run_until_done()))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_run_in_workdir_in_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let graph = ActionGraph::new(vec![
        Action::new(0, "gen").with_command("echo hello > out.txt"),
        Action::new(1, "check")
            .with_command("grep hello out.txt")
            .with_prerequisites([0]),
        Action::new(2, "group").with_prerequisites([1]),
    ])
    .unwrap();
    let engine = engine_for(graph, dir.path(), None);

    assert!(run(&engine).await);
    let check = engine.result_of(1).unwrap();
    assert_eq!(check.exit_code, Some(0));
    assert!(check.output.contains("hello"));
    assert_eq!(engine.status_of(2).map(|s| s.0), Some(ActionStatus::Finished));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_command_reports_exit_code_and_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let graph = ActionGraph::new(vec![
        Action::new(0, "broken").with_command("echo oops >&2; exit 3"),
        Action::new(1, "after").with_command("true").with_prerequisites([0]),
    ])
    .unwrap();
    let engine = engine_for(graph, dir.path(), None);

    assert!(!run(&engine).await);
    let broken = engine.result_of(0).unwrap();
    assert_eq!(broken.exit_code, Some(3));
    assert!(broken.output.contains("oops"));
    assert_eq!(engine.status_of(1).map(|s| s.0), Some(ActionStatus::Error));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_kills_running_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let graph = ActionGraph::new(vec![Action::new(0, "hang").with_command("sleep 30")]).unwrap();
    let engine = engine_for(graph, dir.path(), None);

    let waiter = {
        let engine = engine.clone();
        tokio::task::spawn_blocking(move || engine.run_until_done())
    };

    with_timeout(async {
        while engine.snapshot().counts.running == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    engine.cancel();

    assert!(!with_timeout(waiter).await.unwrap());
    let result = engine.result_of(0).unwrap();
    assert!(result.canceled);
    assert!(result.duration < Duration::from_secs(30));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn artifact_cache_skips_unchanged_actions() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "v1").unwrap();

    let graph = || {
        let mut copy = Action::new(0, "copy")
            .with_command("cp a.txt b.txt && echo ran >> log.txt")
            .with_artifact_check(true);
        copy.inputs = vec!["a.txt".into()];
        copy.outputs = vec!["b.txt".into()];
        ActionGraph::new(vec![copy]).unwrap()
    };
    let runs = || {
        fs::read_to_string(dir.path().join("log.txt"))
            .unwrap_or_default()
            .lines()
            .count()
    };

    // Cold: miss, compile, record.
    let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());
    assert!(run(&engine_for(graph(), dir.path(), Some(store))).await);
    assert_eq!(runs(), 1);
    assert!(dir.path().join(".actiongraph/fingerprints").is_file());

    // Warm, with a store reloaded from disk: hit.
    let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());
    let engine = engine_for(graph(), dir.path(), Some(store));
    assert!(run(&engine).await);
    assert_eq!(runs(), 1);
    assert_eq!(engine.result_of(0).unwrap().output, "artifact cache hit");

    // Changed input: miss again.
    fs::write(dir.path().join("a.txt"), "v2").unwrap();
    let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());
    assert!(run(&engine_for(graph(), dir.path(), Some(store))).await);
    assert_eq!(runs(), 2);

    // Missing output: miss again.
    fs::remove_file(dir.path().join("b.txt")).unwrap();
    let store = Arc::new(FingerprintStore::open(dir.path()).unwrap());
    assert!(run(&engine_for(graph(), dir.path(), Some(store))).await);
    assert_eq!(runs(), 3);
}

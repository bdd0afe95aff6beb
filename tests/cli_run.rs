#![cfg(unix)]

use std::fs;
use std::path::Path;

use clap::Parser;

use actiongraph::cli::CliArgs;
use actiongraph::config::load_and_validate;
use actiongraph::errors::ActionGraphError;
use actiongraph::{RunSettings, run};
use actiongraph_test_utils::{init_tracing, with_timeout};

fn write_project(dir: &Path, body: &str) -> String {
    let path = dir.join("ActionGraph.toml");
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

const PROJECT: &str = r#"
[config]
jobs = 2

[action.compile_a]
cmd = "echo a > a.o"

[action.compile_b]
cmd = "echo b > b.o"

[action.link]
cmd = "cat a.o b.o > app"
after = ["compile_a", "compile_b"]

[action.package]
cmd = "cp app app.pkg"
after = ["link"]
"#;

#[test]
fn cli_flags_override_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);
    let cfg = load_and_validate(&config).unwrap();

    let args = CliArgs::parse_from(["actiongraph", "--config", &config]);
    let settings = RunSettings::resolve(&args, &cfg).unwrap();
    assert_eq!(settings.jobs, 2);
    assert_eq!(settings.local_sinks, 0);
    assert!(settings.cache);
    assert!(!settings.stop_on_error);
    assert!(settings.stall.abort_after.is_none());

    let args = CliArgs::parse_from([
        "actiongraph",
        "--config",
        &config,
        "-j",
        "7",
        "--local-sinks",
        "2",
        "--max-weight",
        "3.5",
        "--no-cache",
        "--stop-on-error",
    ]);
    let settings = RunSettings::resolve(&args, &cfg).unwrap();
    assert_eq!(settings.jobs, 7);
    assert_eq!(settings.local_sinks, 2);
    assert_eq!(settings.max_weight, Some(3.5));
    assert!(!settings.cache);
    assert!(settings.stop_on_error);
}

#[test]
fn cli_limits_are_range_checked() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);
    let cfg = load_and_validate(&config).unwrap();

    for arg in ["--max-weight=0", "--max-weight=-2", "--max-weight=NaN", "--jobs=0"] {
        let flag = arg.split('=').next().unwrap();
        let args = CliArgs::parse_from(["actiongraph", "--config", &config, arg]);
        match RunSettings::resolve(&args, &cfg) {
            Err(ActionGraphError::ConfigError(msg)) => assert!(msg.contains(flag), "{arg}: {msg}"),
            other => panic!("{arg}: expected ConfigError, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn zero_max_weight_fails_before_running_anything() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);

    let args = CliArgs::parse_from(["actiongraph", "--config", &config, "--max-weight", "0"]);
    let err = run(args).await.unwrap_err();
    assert!(format!("{err:#}").contains("--max-weight"));
    assert!(!dir.path().join("a.o").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_builds_project_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);

    let args = CliArgs::parse_from(["actiongraph", "--config", &config]);
    assert!(with_timeout(run(args)).await.unwrap());
    assert_eq!(fs::read_to_string(dir.path().join("app.pkg")).unwrap(), "a\nb\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitioned_run_builds_project_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);

    let args = CliArgs::parse_from(["actiongraph", "--config", &config, "--local-sinks", "2"]);
    assert!(with_timeout(run(args)).await.unwrap());
    assert!(dir.path().join("app.pkg").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_action_makes_run_unsuccessful() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(
        dir.path(),
        r#"
[action.bad]
cmd = "exit 1"

[action.after]
cmd = "touch after.txt"
after = ["bad"]
"#,
    );

    let args = CliArgs::parse_from(["actiongraph", "--config", &config]);
    assert!(!with_timeout(run(args)).await.unwrap());
    assert!(!dir.path().join("after.txt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dry_run_executes_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), PROJECT);

    let args = CliArgs::parse_from(["actiongraph", "--config", &config, "--dry-run", "--local-sinks", "1"]);
    assert!(with_timeout(run(args)).await.unwrap());
    assert!(!dir.path().join("a.o").exists());
}

#[tokio::test]
async fn invalid_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path(), "[action.a]\ncmd = \"true\"\nafter = [\"ghost\"]\n");

    let args = CliArgs::parse_from(["actiongraph", "--config", &config]);
    let err = run(args).await.unwrap_err();
    assert!(format!("{err:#}").contains("ghost"));
}

// src/exec/process.rs

//! Compile-phase runner that executes action commands as shell processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::engine::{ActionResult, CancelToken, Completion, Job, Runner};
use crate::exec::cache::FingerprintStore;
use crate::graph::Action;

/// Runs each action's `command` through the platform shell.
///
/// Jobs execute on the engine's worker threads and drive the child process
/// on the given Tokio runtime. Phony actions (no command) finish
/// immediately. On cancellation the child is killed and the action is
/// reported as canceled.
pub struct ProcessRunner {
    handle: Handle,
    workdir: PathBuf,
    fingerprints: Option<Arc<FingerprintStore>>,
}

impl ProcessRunner {
    pub fn new(handle: Handle, workdir: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            workdir: workdir.into(),
            fingerprints: None,
        }
    }

    /// Record fingerprints of successful cache-enabled actions.
    pub fn with_fingerprints(mut self, store: Arc<FingerprintStore>) -> Self {
        self.fingerprints = Some(store);
        self
    }
}

impl Runner for ProcessRunner {
    fn try_run(&self, action: &Action, _cancel: &CancelToken) -> Option<Job> {
        let handle = self.handle.clone();
        let workdir = self.workdir.clone();
        let fingerprints = self.fingerprints.clone();
        let action = action.clone();

        Some(Box::new(move |cancel: &CancelToken| {
            let cancel = cancel.clone();
            let completion = handle.block_on(run_action(&action, &workdir, &cancel));

            if let (Completion::Finished(_), Some(store)) = (&completion, fingerprints) {
                if action.artifact_check {
                    if let Err(err) = store.record(&action) {
                        warn!(action = %action.name, error = %err, "failed to record fingerprint");
                    }
                }
            }

            completion
        }))
    }
}

async fn run_action(action: &Action, workdir: &Path, cancel: &CancelToken) -> Completion {
    let Some(ref cmd) = action.command else {
        debug!(action = %action.name, "phony action; nothing to run");
        return Completion::Finished(ActionResult::success(""));
    };

    match run_command(action, cmd, workdir, cancel).await {
        Ok(completion) => completion,
        Err(err) => {
            error!(action = %action.name, error = %err, "action execution error");
            Completion::Failed(ActionResult::failed(None, format!("{err:#}")))
        }
    }
}

async fn run_command(
    action: &Action,
    cmd: &str,
    workdir: &Path,
    cancel: &CancelToken,
) -> Result<Completion> {
    info!(action = %action.name, cmd = %cmd, "starting action process");
    let started = Instant::now();

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("spawning process for action '{}'", action.name))?;

    // Dropping the output future on cancellation drops (and kills) the child.
    tokio::select! {
        output = child.wait_with_output() => {
            let output = output.with_context(|| {
                format!("waiting for process of action '{}'", action.name)
            })?;

            let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
            log.push_str(&String::from_utf8_lossy(&output.stderr));

            let code = output.status.code();
            info!(
                action = %action.name,
                exit_code = ?code,
                success = output.status.success(),
                "action process exited"
            );

            let result = ActionResult {
                exit_code: code,
                output: log,
                duration: started.elapsed(),
                canceled: false,
            };
            if output.status.success() {
                Ok(Completion::Finished(result))
            } else {
                Ok(Completion::Failed(result))
            }
        }

        _ = cancel.cancelled() => {
            info!(
                action = %action.name,
                "cancellation requested for running action; killing process"
            );
            Ok(Completion::Failed(ActionResult::canceled().with_duration(started.elapsed())))
        }
    }
}

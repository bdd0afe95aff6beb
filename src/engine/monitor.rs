// src/engine/monitor.rs

//! Stall/telemetry monitor.
//!
//! A background thread samples the engine's state-change counter at a fixed
//! interval. While the counter moves it logs progress at `debug`. Once the
//! counter has been unchanged for `threshold`, it emits a [`StallReport`]
//! (per-runner load, running action descriptions, aggregate counts) and
//! repeats it every further `threshold`. The monitor never influences
//! scheduling, with one opt-in exception: `abort_after` fails all queued
//! actions once the engine has been stalled that long with nothing running.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::options::StallOptions;
use crate::engine::scheduler::WeakEngine;
use crate::engine::snapshot::StallReport;

/// Running monitor thread. Dropping the sender stops it.
pub(crate) struct MonitorHandle {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(self) {
        drop(self.stop);
        if self.thread.join().is_err() {
            warn!("stall monitor thread panicked");
        }
    }
}

pub(crate) fn spawn(engine: WeakEngine, options: StallOptions) -> io::Result<MonitorHandle> {
    let (stop, stop_rx) = mpsc::channel::<()>();

    let thread = thread::Builder::new()
        .name("actiongraph-monitor".to_string())
        .spawn(move || monitor_loop(engine, options, stop_rx))?;

    Ok(MonitorHandle { stop, thread })
}

fn monitor_loop(engine: WeakEngine, options: StallOptions, stop_rx: mpsc::Receiver<()>) {
    debug!(
        interval_ms = options.interval.as_millis() as u64,
        threshold_ms = options.threshold.as_millis() as u64,
        "stall monitor started"
    );

    let mut last_generation: Option<u64> = None;
    let mut last_change = Instant::now();
    let mut next_report = options.threshold;

    loop {
        match stop_rx.recv_timeout(options.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(engine) = engine.upgrade() else {
            break;
        };
        if engine.is_done() {
            break;
        }

        let snapshot = engine.snapshot();
        if last_generation != Some(snapshot.generation) {
            last_generation = Some(snapshot.generation);
            last_change = Instant::now();
            next_report = options.threshold;

            let counts = snapshot.counts;
            debug!(
                finished = counts.finished,
                error = counts.error,
                running = counts.running,
                queued = counts.queued,
                total = counts.total(),
                "engine progress"
            );
            continue;
        }

        let stalled_for = last_change.elapsed();
        let nothing_running = snapshot.counts.running == 0;

        if stalled_for >= next_report {
            let report = StallReport {
                stalled_for,
                snapshot,
            };
            warn!("engine stalled: {report}");
            engine.report_stall(&report);
            next_report += options.threshold;
        }

        if let Some(abort_after) = options.abort_after {
            if stalled_for >= abort_after && nothing_running {
                warn!(
                    stalled_secs = stalled_for.as_secs_f64(),
                    "stall exceeded abort threshold with nothing running; failing remaining actions"
                );
                let failed = engine.force_fail_remaining(&format!(
                    "aborted: no progress for {:.1}s",
                    stalled_for.as_secs_f64()
                ));
                info!(failed, "stall monitor force-failed queued actions");
            }
        }
    }

    debug!("stall monitor stopped");
}

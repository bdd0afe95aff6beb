// src/exec/summary.rs

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::engine::{ActionReport, Reporter, StallReport};
use crate::types::ActionStatus;

/// Collects terminal action reports and prints a run summary.
#[derive(Debug, Default)]
pub struct SummaryReporter {
    reports: Mutex<Vec<ActionReport>>,
}

impl SummaryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ActionReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failed(&self) -> Vec<ActionReport> {
        self.reports()
            .into_iter()
            .filter(|r| r.status == ActionStatus::Error)
            .collect()
    }

    /// Print counts and every failed action with its captured output.
    pub fn print_summary(&self) {
        let reports = self.reports();
        let failed: Vec<&ActionReport> = reports
            .iter()
            .filter(|r| r.status == ActionStatus::Error)
            .collect();
        let canceled = failed
            .iter()
            .filter(|r| r.result.as_ref().is_some_and(|res| res.canceled))
            .count();

        println!(
            "actiongraph: {} actions, {} succeeded, {} failed ({} canceled)",
            reports.len(),
            reports.len() - failed.len(),
            failed.len(),
            canceled
        );

        for report in failed {
            println!("  FAILED {}: {}", report.name, report.description);
            if let Some(ref result) = report.result {
                if let Some(code) = result.exit_code {
                    println!("    exit code: {code}");
                }
                for line in result.output.lines() {
                    println!("    | {line}");
                }
            }
        }
    }
}

impl Reporter for SummaryReporter {
    fn on_action_terminal(&self, report: &ActionReport) {
        match report.status {
            ActionStatus::Finished => {
                let ms = report
                    .result
                    .as_ref()
                    .map(|r| r.duration.as_millis() as u64)
                    .unwrap_or(0);
                info!(action = %report.name, duration_ms = ms, "action finished");
            }
            _ => warn!(action = %report.name, status = %report.status, "action did not succeed"),
        }

        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }

    fn on_stall(&self, report: &StallReport) {
        debug!(stalled_secs = report.stalled_for.as_secs_f64(), "stall reported to summary");
        eprintln!("actiongraph: {report}");
    }
}

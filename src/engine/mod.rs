// src/engine/mod.rs

//! Action-graph scheduling engine.
//!
//! - [`scheduler`] holds [`Engine`]: per-action state, the scan/dispatch
//!   loop, completion and requeue handling, and the completion signal.
//! - [`state`] holds [`ActionState`] and the pure readiness function.
//! - [`runner`] holds the [`Runner`] extension point and its limits.
//! - [`rescan`] coalesces concurrent dispatch requests.
//! - [`monitor`] is the optional stall/telemetry sampler.
//! - [`report`] holds results, job completions and the [`Reporter`] sink.
//!
//! Failure handling: a failing action is recorded as `Error`; queued
//! dependents are failed lazily the next time a scan reaches them, without
//! ever being dispatched. Only the aggregate outcome leaves
//! [`Engine::run_until_done`]; details travel in each action's result.

pub mod cancel;
pub mod monitor;
pub mod options;
pub mod report;
pub mod rescan;
pub mod runner;
pub mod scheduler;
pub mod snapshot;
pub mod state;

pub use cancel::CancelToken;
pub use options::{EngineOptions, StallOptions};
pub use report::{ActionReport, ActionResult, Completion, Job, Reporter};
pub use runner::{Runner, RunnerConfig, RunnerId};
pub use scheduler::Engine;
pub use snapshot::{EngineSnapshot, RunnerSnapshot, StallReport};
pub use state::{ActionState, Readiness, StatusCounts, readiness};

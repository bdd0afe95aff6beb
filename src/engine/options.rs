// src/engine/options.rs

use std::time::Duration;

use crate::engine::cancel::CancelToken;

/// Per-engine behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Cancel the token as soon as any action fails: in-flight work
    /// finishes, nothing new is dispatched.
    pub stop_on_error: bool,

    /// Enable the stall/telemetry monitor started by `Engine::start`.
    pub stall: Option<StallOptions>,

    /// Cancellation signal checked before every dispatch. Share a clone to
    /// cancel from outside (e.g. Ctrl-C).
    pub cancel: CancelToken,
}

/// Stall/telemetry monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallOptions {
    /// Sampling period.
    pub interval: Duration,
    /// Time without any state change before a stall report is emitted.
    pub threshold: Duration,
    /// Time without any state change, with nothing running, after which
    /// every remaining action is failed. `None` never aborts.
    pub abort_after: Option<Duration>,
}

impl Default for StallOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            threshold: Duration::from_secs(30),
            abort_after: None,
        }
    }
}

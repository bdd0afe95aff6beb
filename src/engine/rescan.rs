// src/engine/rescan.rs

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0b01;
const RESCAN_REQUESTED: u8 = 0b10;

/// Two-bit gate that lets exactly one thread walk the action list at a time.
///
/// Requests arriving while a walk is in progress only set
/// `RESCAN_REQUESTED`; the walking thread notices on its way out and walks
/// once more. Any number of concurrent completions therefore collapse into a
/// single follow-up scan.
#[derive(Debug, Default)]
pub struct RescanGate {
    flags: AtomicU8,
}

impl RescanGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `scan` now, or hand the request to the thread already scanning.
    pub fn run(&self, mut scan: impl FnMut()) {
        if self.flags.fetch_or(RESCAN_REQUESTED, Ordering::AcqRel) & RUNNING != 0 {
            return;
        }
        if self.flags.fetch_or(RUNNING, Ordering::AcqRel) & RUNNING != 0 {
            // Another thread won the race and will see our request.
            return;
        }

        loop {
            self.flags.fetch_and(!RESCAN_REQUESTED, Ordering::AcqRel);
            scan();
            if self
                .flags
                .compare_exchange(RUNNING, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

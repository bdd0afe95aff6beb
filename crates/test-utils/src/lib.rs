pub mod builders;
pub mod fake_runner;

use std::sync::Once;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use actiongraph::engine::Engine;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Run `engine.run_until_done()` on a helper thread, failing the test if it
/// does not return within `limit`.
pub fn run_with_deadline(engine: &Engine, limit: Duration) -> bool {
    let (tx, rx) = mpsc::channel();
    let engine = engine.clone();
    thread::spawn(move || {
        let _ = tx.send(engine.run_until_done());
    });
    rx.recv_timeout(limit)
        .unwrap_or_else(|_| panic!("engine did not finish within {limit:?}"))
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

pub mod builders;
pub mod fake_source;

use std::sync::Once;
use std::time::Duration;

use cmdpool::exec::{CommandView, Executor};
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
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `executor` until command `id` satisfies `pred`, returning that view.
///
/// Panics after 5 seconds, or if `id` is not registered.
pub async fn wait_for<F>(executor: &Executor, id: &str, mut pred: F) -> CommandView
where
    F: FnMut(&CommandView) -> bool,
{
    let poll = async {
        loop {
            let view = executor
                .get(id)
                .unwrap_or_else(|| panic!("command {id} is not registered"));
            if pred(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    match tokio::time::timeout(Duration::from_secs(5), poll).await {
        Ok(view) => view,
        Err(_) => panic!(
            "command {id} did not reach the expected state; last seen: {:?}",
            executor.get(id).map(|v| (v.status, v.total_lines, v.last_error))
        ),
    }
}

/// Shorthand for waiting until `id` reaches a terminal state.
pub async fn wait_terminal(executor: &Executor, id: &str) -> CommandView {
    wait_for(executor, id, |v| v.status.is_terminal()).await
}

#![allow(dead_code, unused_imports)]

pub use cmdpool_test_utils::builders;
pub use cmdpool_test_utils::{init_tracing, wait_for, wait_terminal, with_timeout};

use cmdpool::exec::{Executor, ExecutorOptions};

/// Executor with test-friendly settings: short auto-restart delay and the
/// given buffer size.
pub fn executor_with_lines(max_output_lines: usize) -> Executor {
    Executor::new(ExecutorOptions {
        max_output_lines,
        restart_delay: std::time::Duration::from_millis(50),
        ..ExecutorOptions::default()
    })
}

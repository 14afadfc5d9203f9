//! Tracing output for the lifecycle suites.
//!
//! The lifecycle code logs swallowed close failures and timeouts at `warn`,
//! so the default filter keeps those visible in failing test output.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static SUBSCRIBER: OnceCell<()> = OnceCell::new();

/// Install the test subscriber once per process.
///
/// Filter source: `TEST_LOG`, else `RUST_LOG`, else `warn`. For example
/// `TEST_LOG=db_test_utils=debug` adds the teardown and connection details.
pub fn init() {
    SUBSCRIBER.get_or_init(|| {
        let filter = std::env::var("TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        // a harness may have installed its own subscriber already
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_target(true)
            .try_init();
    });
}

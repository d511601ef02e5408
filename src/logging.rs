// Logging - tracing subscriber setup for the binaries and tests

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber.
///
/// Level comes from `RUST_LOG` (default `info`), e.g.
/// `RUST_LOG=retail_analytics=debug` to see pipeline stage transitions.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// Verbose logging for tests; safe to call more than once.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Environment variable consulted first for the log filter
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber filtered by `LOG_LEVEL` / `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`] but routes output through the test harness.
pub fn init_test_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_test_writer()
        .try_init()
        .is_ok()
}

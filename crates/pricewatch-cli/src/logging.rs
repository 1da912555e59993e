//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Log filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PRICEWATCH_LOG";

/// Installs a stderr subscriber so stdout carries only JSON.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}

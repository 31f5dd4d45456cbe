//! Logging - `tracing` subscriber for the CLI. Library code only emits events.

use tracing_subscriber::{fmt, EnvFilter};

/// Set to `1` for JSON lines instead of human-readable output.
pub const LOG_JSON_ENV: &str = "KYCNODE_LOG_JSON";

fn json_requested(value: Option<String>) -> bool {
    value.map(|v| v.trim() == "1").unwrap_or(false)
}

/// Install the global subscriber. `RUST_LOG` filters, default `info`.
/// A second call is a no-op.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_requested(std::env::var(LOG_JSON_ENV).ok()) {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

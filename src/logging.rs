//! Structured logging via `tracing`.
//!
//! Logs go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` overrides the configured level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber at `level` (`trace` .. `error`, or `off`).
///
/// Calling it again is harmless; only the first call takes effect.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

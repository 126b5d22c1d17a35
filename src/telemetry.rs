//! Process-wide `tracing` subscriber setup.
//!
//! Structured logging only: no OpenTelemetry exporter. Verbosity is controlled by
//! `RUST_LOG` (standard `EnvFilter` syntax), defaulting to `info` for this crate and
//! `warn` for dependencies.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global `tracing` subscriber. Call once, at process startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,x402_gate=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

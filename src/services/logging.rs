//! Development-time tracing setup.
//!
//! The core's own structured records flow through the `Telemetry` port;
//! this module only wires up the `tracing` subscriber that the
//! `TracingTelemetry` adapter (and any library diagnostics) write to.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to the given filter. Output goes to
/// stderr in compact format. Safe to call once per process; embedding
/// applications that install their own subscriber should skip this.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

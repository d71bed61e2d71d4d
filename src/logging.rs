//! Tracing bootstrap for hosts embedding the middleware.
//!
//! The core itself only emits `tracing` events; hosts that do not install
//! their own subscriber can call [`init_tracing`] once at startup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "intent_gate=info";

/// Initialize a stderr `tracing` subscriber with `RUST_LOG`-style filtering.
///
/// Falls back to `intent_gate=info` when the environment carries no
/// filter. Repeated calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(filter)
        .try_init();
}

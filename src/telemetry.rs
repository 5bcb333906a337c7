//! Tracing setup for a host embedding this wallet.
//!
//! The teacher exports OpenTelemetry spans and metrics from a long-running
//! HTTP server; this crate is a library a host links in, so there is no
//! service process to export resource attributes for. What carries over is
//! the logging shape itself: structured `tracing` spans/events with an
//! env-filterable subscriber, not `println!`. A host that does want OTLP
//! export wires its own layer around the same `tracing` calls this crate
//! already makes; this helper just covers the common "give me readable logs"
//! case for local tooling and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `tracing` subscriber filtered by `RUST_LOG` (defaulting
/// to `info`). Safe to call once per process; a second call is a no-op
/// error from `tracing`'s global dispatcher, which this function swallows
/// since tests commonly call it from multiple `#[tokio::test]` bodies.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

//! Logging bootstrap
//!
//! The library only emits `tracing` events. Hosts and tests that want them
//! printed call [`init_tracing`] once at startup.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Filter override checked before `RUST_LOG`
pub const LOG_ENV: &str = "FLOW_BLOCKS_LOG";

static INIT: OnceLock<()> = OnceLock::new();

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Some(filter) = std::env::var(LOG_ENV)
        .ok()
        .and_then(|level| tracing_subscriber::EnvFilter::try_new(level).ok())
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Install a console subscriber once per process.
///
/// Environment variables:
/// - `FLOW_BLOCKS_LOG`: optional level/filter (`info`, `flow_blocks=debug`, ...).
/// - `RUST_LOG`: fallback filter. Defaults to `info`.
///
/// Does nothing if another global subscriber is already installed.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let console_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false);
        let _ = tracing_subscriber::registry()
            .with(resolve_env_filter())
            .with(console_layer)
            .try_init();
    });
}

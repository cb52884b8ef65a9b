//! `tracing_subscriber` bootstrap, grounded on `moltis`'s
//! `crates/cli/src/main.rs` startup sequence: an `EnvFilter` seeded from
//! an env var (default `info`) with an optional JSON formatter.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Env var consulted for the filter directive, e.g. `PEERDEV_LOG=debug`.
pub const LOG_ENV_VAR: &str = "PEERDEV_LOG";

/// Install a global `tracing` subscriber. Call once, from `main`.
///
/// `json` switches the formatter to newline-delimited JSON, for
/// ingestion by a log pipeline; the human-readable formatter is used
/// otherwise.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

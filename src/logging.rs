//! Structured logging setup.
//!
//! The library only emits `tracing` events; binaries call [`init`] once to
//! print them. The filter is read from the `SIMINDEX_LOG` environment
//! variable, e.g. `SIMINDEX_LOG=debug` or `SIMINDEX_LOG=similarity_index::mtree=debug`.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SIMINDEX_LOG";

/// Install the global subscriber with an `info` default.
pub fn init() {
    init_with_default("info");
}

/// Install the global subscriber, using `default_level` when `SIMINDEX_LOG` is unset.
/// Later calls are ignored.
pub fn init_with_default(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

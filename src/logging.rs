//! Logging setup.
//!
//! Log lines go to stderr so stdout stays reserved for the run summary and
//! `crashd parse` output. `RUST_LOG` takes precedence over the CLI level.

use std::env;

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());

    let _ = fmt()
        .with_env_filter(EnvFilter::new(&rust_log))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

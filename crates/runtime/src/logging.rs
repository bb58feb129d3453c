//! Structured logging init (§4.8, ambient stack): a single
//! `tracing-subscriber` setup every binary embedding the runtime calls
//! once at startup.

use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`,
/// falling back to `default_directive` when the variable is unset or
/// unparsable. Safe to call more than once per process; later calls are
/// no-ops (a global subscriber can only be installed once).
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

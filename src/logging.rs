//! Diagnostic logging to stderr.
//!
//! Stdout carries the transcript, so the subscriber always writes to stderr.
//! The filter comes from `QUASAR_LOG` using `EnvFilter` directive syntax.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "QUASAR_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Filter for `directive`, falling back to [`DEFAULT_LOG_FILTER`] when it is
/// missing or does not parse.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init_logging(directive: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directive))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

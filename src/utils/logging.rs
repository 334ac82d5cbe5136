//! Tracing setup for binaries and tests that embed the crate.

use tracing_subscriber::EnvFilter;

/// Environment variable read when no explicit filter is given.
pub const LOG_ENV: &str = "RECONCORD_LOG";

/// Builds the filter from `RECONCORD_LOG`, then `directives` (usually the
/// config's `log_filter`), falling back to `warn`.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return filter;
    }
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Installs a global fmt subscriber. Returns false when one is already set.
pub fn init_tracing(directives: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives))
        .with_target(true)
        .try_init()
        .is_ok()
}

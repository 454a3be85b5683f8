use tracing_subscriber::EnvFilter;

/// Environment variable consulted for log filtering, e.g.
/// `DBNAV_LOG=dbnav_daemon=debug`.
pub const LOG_ENV_VAR: &str = "DBNAV_LOG";

/// Initialize the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops (embedding applications may have installed their
/// own subscriber already).
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

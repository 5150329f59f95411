use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RAPORD_LOG";
const DEFAULT_FILTER: &str = "rapord=info";

/// Installs the stderr subscriber. Stdout carries the IPC protocol, so
/// nothing may log there. Safe to call twice; the second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

//! Logging setup

use tracing_subscriber::EnvFilter;

/// Install a console subscriber.
///
/// `RUST_LOG` wins over `level` when set. Returns false if a global
/// subscriber was already installed.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Filter for our crates at `level`, everything else at warn
pub fn build_filter(level: &str) -> EnvFilter {
    let level = match level.trim().to_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error") => l.to_string(),
        _ => "info".to_string(),
    };
    EnvFilter::new(format!(
        "warn,marionette_core={level},marionette_motion={level},marionette_transport={level},marionette_runtime={level},puppet_demo={level}"
    ))
}

//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays parseable. `RUST_LOG` wins over the
//! configured level; the configured level applies to `autolog` crates only.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a bare level such as `"debug"`.
pub fn default_directive(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!("autolog={level},autolog_core={level}")
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

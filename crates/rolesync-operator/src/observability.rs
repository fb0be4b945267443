//! Log setup for the operator.
//!
//! A reloadable `EnvFilter` is installed before the config is read, then
//! narrowed to the configured level. `RUST_LOG` always takes precedence.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Crates whose events follow the configured level. Everything else logs at `warn`.
const OPERATOR_TARGETS: [&str; 4] = [
    "rolesync",
    "rolesync_operator",
    "rolesync_storage",
    "rolesync_db_memory",
];

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter directive that applies `level` to the operator crates only.
pub fn filter_directive(level: &str) -> String {
    let mut directive = String::from("warn");
    for target in OPERATOR_TARGETS {
        directive.push(',');
        directive.push_str(target);
        directive.push('=');
        directive.push_str(level);
    }
    directive
}

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let filter = if rust_log_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(level)))
    } else {
        EnvFilter::new(filter_directive(level))
    };

    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Switches to the configured level once the config is loaded.
pub fn apply_logging_level(level: &str) {
    if rust_log_set() {
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(filter_directive(level))) {
        tracing::warn!(error = %e, level, "Failed to change log level");
    }
}

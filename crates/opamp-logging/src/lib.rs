//! # opamp-logging
//!
//! Installs the global `tracing` subscriber for the bridge: an [`EnvFilter`]
//! built from [`LoggingSettings`] (overridden by `RUST_LOG`) feeding a JSON or
//! human-readable fmt layer on stdout.

#![deny(unsafe_code)]

use opamp_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Build the filter directive string, e.g. `info,opamp_proxy=debug`.
pub fn filter_directives(settings: &LoggingSettings) -> String {
    let mut directives = settings.level.as_filter_str().to_string();
    for (module, level) in &settings.module_levels {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(level.as_filter_str());
    }
    directives
}

/// Initialize logging. Call once at startup.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TryInitError> {
    let directives = filter_directives(settings);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .pretty()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
}

//! Tracing subscriber setup for binaries embedding the mediator.
//!
//! The library only emits through `tracing` and `metrics`; installing a
//! subscriber is left to the host. This is the setup `courier-demo` uses.

use std::io::{self, IsTerminal};

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Builds the filter from `config.filter`, overridable through `RUST_LOG`.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] if the directive string does not parse.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, TelemetryError> {
    let directives =
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| config.filter.clone());
    EnvFilter::try_new(directives).map_err(|error| TelemetryError::Filter(error.to_string()))
}

/// Installs a global `fmt` subscriber writing to stderr, as JSON lines when
/// `config.json` is set.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a bad filter and
/// [`TelemetryError::Subscriber`] if a global subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.compact().finish())
    };

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

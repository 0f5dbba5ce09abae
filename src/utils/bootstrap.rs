//! Bootstrap utilities for hosts embedding the protocol engine.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Tracing could not be installed.
#[derive(Debug, thiserror::Error)]
#[error("Failed to install tracing subscriber: {0}")]
pub struct TracingInitError(String);

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize tracing with the MGAM_LOG environment variable.
///
/// Defaults to "info" level if MGAM_LOG is not set. Panics if a global
/// subscriber is already installed; use [`try_init_tracing`] when that is
/// possible.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init_tracing`], but reports an already installed subscriber.
pub fn try_init_tracing() -> Result<(), TracingInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TracingInitError(e.to_string()))
}

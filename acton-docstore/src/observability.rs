//! Structured logging

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON tracing subscriber filtered by `service.log_level`
///
/// An invalid filter directive falls back to `info`. Calling this when a
/// global subscriber is already installed leaves that subscriber in place.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match tracing_subscriber::fmt().json().with_env_filter(filter).try_init() {
        Ok(()) => {
            tracing::info!("Tracing initialized for service: {}", config.service.name);
        }
        Err(e) => {
            tracing::debug!("Tracing subscriber already installed: {}", e);
        }
    }

    Ok(())
}

//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Installs the global JSON subscriber.
///
/// The filter comes from [`ServiceConfig::effective_log_level`]; an
/// unparsable filter falls back to `info`. Fails if a global subscriber is
/// already installed.
///
/// [`ServiceConfig::effective_log_level`]: crate::config::ServiceConfig::effective_log_level
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.effective_log_level();

    tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        log_level,
        "tracing initialized"
    );
    Ok(())
}

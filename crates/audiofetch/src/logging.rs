//! Process-wide logging setup.
//!
//! Library code logs through the `log` macros and opens `tracing` spans.
//! [`init_logging`] bridges `log` records into `tracing` and installs one
//! subscriber for both.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{AudioFetchError, Result};

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Fails if a logger or subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(&config.level)?,
    };

    let json = config.json;
    let subscriber = Registry::default()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)));

    tracing_log::LogTracer::init()
        .map_err(|e| AudioFetchError::Logging(format!("log bridge: {}", e)))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AudioFetchError::Logging(e.to_string()))?;

    log::debug!("Logging initialized (level {}, json {})", config.level, json);
    Ok(())
}

fn configured_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| AudioFetchError::Logging(format!("invalid level '{}': {}", level, e)))
}

//! Logging initialization.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. With `logging.json` enabled the
/// output is one JSON object per line, suitable for log shippers.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {e}", config.level))?;

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set subscriber: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set subscriber: {e}"))?;
    }

    Ok(())
}

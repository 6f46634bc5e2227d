//! Logging initialization.

use crate::settings::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `logging.level`.
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let fmt_layer = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(logging.enable_target)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_target(logging.enable_target)
            .boxed(),
    };

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(level = %logging.level, format = %logging.format, "logging initialized");
    Ok(())
}

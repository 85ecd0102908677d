use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// `RUST_LOG` wins over the configured level. Serenity's gateway chatter is
/// capped at `warn` unless the filter names it explicitly.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|err| anyhow!("invalid log level {:?}: {err}", config.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn default_directives(level: &str) -> String {
    format!("{},serenity=warn,tungstenite=warn", level.trim())
}

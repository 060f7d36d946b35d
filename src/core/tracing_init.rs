use crate::core::config::LoggingConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
///
/// Request spans from tower-http are emitted at debug, so they only show up
/// when the configured level is debug or lower.
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},account_service={level},tower_http={level}"))
}

/// Install the global subscriber. JSON lines unless console output is requested
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&config.level));

    let use_console = config.console || config.format == "console";

    let result = if use_console {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_ansi(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

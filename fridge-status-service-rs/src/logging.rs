//! # Structured Logging
//!
//! Subscriber setup for the service. `RUST_LOG` takes precedence over the
//! configured level. `try_init` also bridges the `log` facade, which carries
//! the configuration warnings from `config-rs`.

use config_rs::{LogFormat, LogSettings};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Build the level filter for the given settings.
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let subscriber = Registry::default().with(env_filter(settings));

    match settings.format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Text => subscriber
            .with(fmt::layer().with_target(true))
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        let settings = LogSettings {
            level: "not a level [".to_string(),
            format: LogFormat::Text,
        };
        // constructing the filter must not panic
        let _ = env_filter(&settings);
    }
}

//! Logging system setup and configuration
//!
//! Initializes the global tracing subscriber. `RUST_LOG` takes precedence
//! over the configured level.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Builds the filter from `RUST_LOG`, falling back to `level`.
fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(level)?),
    }
}

/// Initializes the global subscriber with human-readable or JSON output.
///
/// Fails if the level cannot be parsed or a subscriber is already set.
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = build_filter(&settings.level)?;

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

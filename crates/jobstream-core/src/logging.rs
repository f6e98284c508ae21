//! Tracing subscriber setup.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// Environment variable holding a filter directive, e.g. `jobstream_core=debug`.
pub const LOG_ENV: &str = "JOBSTREAM_LOG";

const LOG_FILE_PREFIX: &str = "jobstream.log";

fn build_filter(env_value: Option<&str>, level: &str) -> Result<EnvFilter> {
    let directive = env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(level);
    EnvFilter::try_new(directive).with_context(|| format!("Invalid log filter '{directive}'"))
}

/// Installs the global subscriber: stderr always, plus a daily file when a
/// log directory is configured.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// stops the file writer.
///
/// # Errors
/// Returns an error for an invalid filter, an unusable log directory, or
/// when a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(env_value.as_deref(), &config.level)?;

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {dir}"))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_value_overrides_configured_level() {
        let filter = build_filter(Some("debug"), "info").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_blank_env_value_falls_back_to_level() {
        let filter = build_filter(Some("  "), "warn").unwrap();
        assert_eq!(filter.to_string(), "warn");
        let filter = build_filter(None, "error").unwrap();
        assert_eq!(filter.to_string(), "error");
    }
}

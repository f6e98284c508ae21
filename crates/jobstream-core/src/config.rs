//! Configuration management for jobstream.
//!
//! Loads configuration from ${JOBSTREAM_HOME}/config.toml with defaults for
//! every field.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feedback::{MAIN_CPP, REPORT_JSON, SOLUTION_JSON};

pub mod paths {
    //! Path resolution for jobstream configuration and logs.
    //!
    //! JOBSTREAM_HOME resolution order:
    //! 1. JOBSTREAM_HOME environment variable (if set)
    //! 2. ~/.config/jobstream (default)

    use std::path::PathBuf;

    /// Returns the jobstream home directory, or `None` when neither
    /// JOBSTREAM_HOME nor a home directory is available.
    pub fn jobstream_home() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("JOBSTREAM_HOME") {
            return Some(PathBuf::from(home));
        }
        dirs::home_dir().map(|h| h.join(".config").join("jobstream"))
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> Option<PathBuf> {
        jobstream_home().map(|home| home.join("config.toml"))
    }
}

/// Stream loop and poller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub poll_interval_ms: u64,
    pub resubscribe_backoff_ms: u64,
    /// Timeout for a single status or artifact request.
    pub request_timeout_ms: u64,
    /// Tail kept of the raw terminal fallback, in chars.
    pub max_terminal_chars: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            resubscribe_backoff_ms: 1000,
            request_timeout_ms: 10_000,
            max_terminal_chars: 200_000,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn resubscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

/// Artifacts fetched after a job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub names: Vec<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            names: [MAIN_CPP, SOLUTION_JSON, REPORT_JSON]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when JOBSTREAM_LOG is unset.
    pub level: String,
    /// Directory for daily log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub artifacts: ArtifactsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        match paths::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize config to TOML")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.stream.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.stream.resubscribe_backoff(), Duration::from_secs(1));
        assert_eq!(config.stream.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.artifacts.names,
            vec!["main.cpp", "solution.json", "report.json"]
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[stream]\nresubscribe_backoff_ms = 250\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.stream.resubscribe_backoff_ms, 250);
        assert_eq!(config.stream.poll_interval_ms, 2000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, None);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[stream\npoll_interval_ms = 1").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config from"));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.logging.directory = Some("/tmp/logs".to_string());
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}

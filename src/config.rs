//! Configuration loading and persistence.
//!
//! Handles reading and writing the execlink configuration file. The file
//! is plain JSON under the platform config directory; `EXECLINK_CONFIG_DIR`
//! overrides the directory for tests and unusual deployments.
//!
//! Timing knobs default to the values in [`crate::constants`]. Integration
//! tests shrink them instead of mocking clocks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::constants;

/// Configuration for the execlink engine and CLI.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Execution host URL (`ws://`, `wss://`, or http(s) equivalents).
    pub server_url: String,
    /// Hard job execution timeout, milliseconds.
    pub job_timeout_ms: u64,
    /// Fixed delay between automatic reconnect attempts, milliseconds.
    pub reconnect_delay_ms: u64,
    /// Delay before the fresh connect of a forced reconnect, milliseconds.
    pub force_reconnect_delay_ms: u64,
    /// Timeout for a single socket open attempt, milliseconds.
    pub connect_timeout_ms: u64,
    /// Automatic reconnect attempt bound.
    pub max_reconnect_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: constants::DEFAULT_SERVER_URL.to_string(),
            job_timeout_ms: constants::JOB_TIMEOUT.as_millis() as u64,
            reconnect_delay_ms: constants::RECONNECT_DELAY.as_millis() as u64,
            force_reconnect_delay_ms: constants::FORCE_RECONNECT_DELAY.as_millis() as u64,
            connect_timeout_ms: constants::CONNECT_TIMEOUT.as_millis() as u64,
            max_reconnect_attempts: constants::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl Config {
    /// Job execution timeout as a [`Duration`].
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Automatic reconnect delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Forced-reconnect delay as a [`Duration`].
    #[must_use]
    pub fn force_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.force_reconnect_delay_ms)
    }

    /// Socket open timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `EXECLINK_CONFIG_DIR` overrides the platform default when set.
    ///
    /// # Errors
    ///
    /// Fails when no config directory can be determined or created.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(explicit) = std::env::var("EXECLINK_CONFIG_DIR") {
            PathBuf::from(explicit)
        } else {
            dirs::config_dir()
                .context("could not determine config directory")?
                .join("execlink")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the config file inside [`Config::config_dir`].
    ///
    /// # Errors
    ///
    /// Fails when the config directory cannot be resolved.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load the config file, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or syntactically invalid config files. A missing
    /// file is not an error.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path (missing file → defaults).
    ///
    /// # Errors
    ///
    /// Fails on unreadable or invalid JSON content.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Persist to the default config path.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created or the file written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    ///
    /// Fails when serialization or the write fails.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("could not serialize config")?;
        fs::write(path, text)
            .with_context(|| format!("could not write config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_track_constants() {
        let config = Config::default();
        assert_eq!(config.server_url, constants::DEFAULT_SERVER_URL);
        assert_eq!(config.job_timeout(), constants::JOB_TIMEOUT);
        assert_eq!(config.reconnect_delay(), constants::RECONNECT_DELAY);
        assert_eq!(config.max_reconnect_attempts, constants::MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.server_url = "ws://example.test:9999/ws".to_string();
        config.job_timeout_ms = 1234;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, "ws://example.test:9999/ws");
        assert_eq!(loaded.job_timeout(), Duration::from_millis(1234));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded.server_url, constants::DEFAULT_SERVER_URL);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server_url":"ws://partial.test/ws"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server_url, "ws://partial.test/ws");
        assert_eq!(loaded.job_timeout(), constants::JOB_TIMEOUT);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}

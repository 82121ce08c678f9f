//! Configuration loading and persistence.
//!
//! Reads `config.json` from the data directory and applies `CMUX_*`
//! environment overrides on top. Everything has a sensible default, so
//! a missing file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::constants::{DAEMON_ENDPOINT, DEFAULT_SCROLLBACK_LINES};

/// Engine configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Well-known IPC endpoint base name.
    pub endpoint: String,
    /// Scrollback lines retained per pane.
    pub scrollback_lines: usize,
    /// Command-log and transcript retention in days.
    /// 0 = keep forever; negative falls back to 90; clamped to 3650.
    pub retention_days: i64,
    /// Application data directory. Not serialized — always derived from
    /// the platform or `CMUX_DATA_DIR`.
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DAEMON_ENDPOINT.to_string(),
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            retention_days: 0,
            data_dir: default_data_dir(),
        }
    }
}

/// Platform data directory for cmux, honoring `CMUX_DATA_DIR`.
///
/// `%LOCALAPPDATA%/cmux` on Windows, the XDG data dir elsewhere; the
/// env override is what tests and portable installs use.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CMUX_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_local_dir()
        .map(|d| d.join("cmux"))
        .unwrap_or_else(|| PathBuf::from("cmux-data"))
}

impl Config {
    /// Load configuration: file, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.data_dir = default_data_dir();
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = default_data_dir().join("config.json");
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        serde_json::from_str(&content).context("parse config.json")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("CMUX_ENDPOINT") {
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }
        if let Ok(scrollback) = std::env::var("CMUX_SCROLLBACK") {
            if let Ok(lines) = scrollback.parse::<usize>() {
                self.scrollback_lines = lines;
            }
        }
        if let Ok(retention) = std::env::var("CMUX_RETENTION_DAYS") {
            if let Ok(days) = retention.parse::<i64>() {
                self.retention_days = days;
            }
        }
    }

    /// Persist the current configuration to `config.json`.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("create {}", self.data_dir.display()))?;
        let config_path = self.data_dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("write {}", config_path.display()))?;
        Ok(())
    }

    /// Directory holding the daily command-log files.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, DAEMON_ENDPOINT);
        assert_eq!(config.scrollback_lines, DEFAULT_SCROLLBACK_LINES);
        assert_eq!(config.retention_days, 0);
    }

    #[test]
    fn test_serialization_skips_data_dir() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"endpoint\""));
        assert!(json.contains("\"scrollbackLines\""));
        assert!(!json.contains("dataDir"));
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = Config::default();
        config.endpoint = "cmux-alt".into();
        config.retention_days = 30;
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.endpoint, "cmux-alt");
        assert_eq!(loaded.retention_days, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let loaded: Config = serde_json::from_str(r#"{"endpoint":"x"}"#).unwrap();
        assert_eq!(loaded.endpoint, "x");
        assert_eq!(loaded.scrollback_lines, DEFAULT_SCROLLBACK_LINES);
    }

    #[test]
    fn test_log_dir_is_under_data_dir() {
        let config = Config::default();
        assert!(config.log_dir().starts_with(&config.data_dir));
    }
}

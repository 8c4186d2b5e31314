//! Configuration for the push listener.
//!
//! Read from a `key = value` file, then overridden by `PUSHSNIFF_*`
//! environment variables. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::extractor::{Extractor, ExtractorConfig};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pushsniff.conf";
const DEFAULT_STOP_TIMEOUT_MS: u64 = 1000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferConfig {
    /// Interfaces to capture on; empty means pick a default
    pub interfaces: Vec<String>,
    /// Capture on every active interface
    pub listen_all: bool,
    pub stop_timeout: Duration,
    pub log_level: String,
    pub extractor: ExtractorConfig,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            listen_all: false,
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl SnifferConfig {
    /// Load from `path`, or from `PUSHSNIFF_CONFIG`, or the default path.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var("PUSHSNIFF_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Parse `key = value` lines; `#` comments and unknown keys are ignored.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config.set(key.trim(), value.trim())?;
            }
        }

        Ok(config)
    }

    /// Compile the configured matchers.
    pub fn build_extractor(&self) -> Result<Extractor, ConfigError> {
        Ok(Extractor::from_config(&self.extractor)?)
    }

    /// Allow environment variable overrides.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        for (var, key) in [
            ("PUSHSNIFF_INTERFACES", "interfaces"),
            ("PUSHSNIFF_LISTEN_ALL", "listen_all"),
            ("PUSHSNIFF_STOP_TIMEOUT_MS", "stop_timeout_ms"),
            ("PUSHSNIFF_LOG_LEVEL", "log_level"),
        ] {
            if let Ok(value) = std::env::var(var) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "interfaces" => {
                self.interfaces = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect();
            }
            "listen_all" => self.listen_all = parse_bool(key, value)?,
            "stop_timeout_ms" => {
                let millis: u64 = value.parse().map_err(|_| invalid(key, value))?;
                self.stop_timeout = Duration::from_millis(millis);
            }
            "log_level" => self.log_level = value.to_string(),
            "server_signature" => self.extractor.server_signature = value.to_string(),
            "server_pattern" => self.extractor.server_pattern = value.to_string(),
            "key_signature" => self.extractor.key_signature = value.to_string(),
            "key_pattern" => self.extractor.key_pattern = value.to_string(),
            _ => {}
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

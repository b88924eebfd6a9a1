//! Configuration for the Loggy proxy process.
//!
//! - Config file discovery: CLI flag, `LOGGY_CONFIG` env var, platform
//!   config directory.
//! - TOML parsing via serde, `#[serde(default)]` throughout so a
//!   partial file only overrides what it names.
//! - Environment variable overrides layered on top of the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete Loggy proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggyConfig {
    pub log_level: String,
    pub proxy: ProxySettings,
    pub control: ControlSettings,
    pub ca: CaSettings,
}

impl Default for LoggyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            proxy: ProxySettings::default(),
            control: ControlSettings::default(),
            ca: CaSettings::default(),
        }
    }
}

/// Data-plane (MITM proxy, C2) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub bind_host: String,
    pub port: u16,
    /// Maximum bytes buffered while teeing a request body for C4.
    pub max_body_bytes: usize,
    pub idle_timeout_secs: u64,
    /// Ring buffer capacity for captured events.
    pub ring_buffer_capacity: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8888,
            max_body_bytes: 1024 * 1024,
            idle_timeout_secs: 60,
            ring_buffer_capacity: 1000,
        }
    }
}

/// Control-plane (HTTP API, C5) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub bind_host: String,
    pub port: u16,
    /// How long `startProxy`/`stopProxy` wait before giving up.
    pub start_probe_ms: u64,
    pub stop_wait_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8889,
            start_probe_ms: 500,
            stop_wait_ms: 300,
        }
    }
}

/// CA store (C1) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSettings {
    /// Directory holding `certs/ca.pem` and `certs/ca-key.pem`, and the
    /// `.proxy.pid` file. Defaults to the platform user-data directory.
    pub data_dir: Option<PathBuf>,
    pub cert_validity_days: i64,
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            cert_validity_days: 3650,
        }
    }
}

impl LoggyConfig {
    /// Resolve the user-data directory: configured value, or the
    /// platform default (`~/.local/share/loggy` on Linux, etc.).
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.ca.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "loggy-proxy", "loggy")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".loggy"))
}

/// Loads a `LoggyConfig`, applying the documented precedence.
pub struct ConfigLoader {
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Precedence: CLI `--config` flag, `LOGGY_CONFIG` env var,
    /// platform config directory, then built-in defaults.
    pub fn load(&self) -> ConfigResult<LoggyConfig> {
        let mut config = if let Some(path) = self.find_config_file() {
            info!("loading configuration from {}", path.display());
            self.load_from_file(&path)?
        } else {
            debug!("no config file found, using defaults");
            LoggyConfig::default()
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("LOGGY_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("LOGGY_CONFIG path does not exist: {}", env_path);
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "loggy-proxy", "loggy") {
            let path = dirs.config_dir().join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn load_from_file(&self, path: &Path) -> ConfigResult<LoggyConfig> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&self, config: &mut LoggyConfig) {
        if let Ok(val) = std::env::var("LOGGY_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Ok(val) = std::env::var("LOGGY_PROXY_PORT") {
            if let Ok(port) = val.parse() {
                config.proxy.port = port;
            }
        }
        if let Ok(val) = std::env::var("LOGGY_CONTROL_PORT") {
            if let Ok(port) = val.parse() {
                config.control.port = port;
            }
        }
    }

    fn validate(&self, config: &LoggyConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log level: {}. must be one of {:?}",
                config.log_level, valid_levels
            )));
        }
        if config.proxy.port == 0 {
            return Err(ConfigError::Validation(
                "proxy port cannot be 0".to_string(),
            ));
        }
        if config.control.port == 0 {
            return Err(ConfigError::Validation(
                "control port cannot be 0".to_string(),
            ));
        }
        if config.proxy.port == config.control.port {
            return Err(ConfigError::Validation(
                "proxy and control ports must differ".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_documented_ports() {
        let config = LoggyConfig::default();
        assert_eq!(config.proxy.port, 8888);
        assert_eq!(config.control.port, 8889);
        assert_eq!(config.proxy.ring_buffer_capacity, 1000);
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
            log_level = "debug"

            [proxy]
            port = 9000
        "#;
        let config: LoggyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.proxy.port, 9000);
        assert_eq!(config.proxy.bind_host, "0.0.0.0");
    }

    #[test]
    fn rejects_invalid_log_level() {
        let config = LoggyConfig {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let loader = ConfigLoader::new();
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn rejects_clashing_ports() {
        let mut config = LoggyConfig::default();
        config.control.port = config.proxy.port;
        let loader = ConfigLoader::new();
        assert!(loader.validate(&config).is_err());
    }
}

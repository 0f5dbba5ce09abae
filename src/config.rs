//! Protocol engine configuration.
//!
//! Supports YAML files and environment variable overrides.

use std::time::Duration;

use serde::Deserialize;

use crate::interfaces::LockupPriority;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "mgam.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "MGAM_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "MGAM";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "MGAM_LOG";

/// Protocol engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Standard retry policy shared by every command.
    pub retry: RetryConfig,
    /// Outer EndSession retries on `DuplicateVoucherRetry`.
    pub duplicate_voucher_retries: u32,
    /// Delay before the single RequestPlay retry, in milliseconds.
    pub request_play_delay_ms: u64,
    /// Employee-card lockups raised by the command handlers.
    pub lockup: LockupConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            duplicate_voucher_retries: 3,
            request_play_delay_ms: 250,
            lockup: LockupConfig::default(),
        }
    }
}

/// Standard retry policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 500,
        }
    }
}

/// Lockup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockupConfig {
    pub priority: LockupPriority,
}

impl Default for LockupConfig {
    fn default() -> Self {
        Self {
            priority: LockupPriority::High,
        }
    }
}

impl ProtocolConfig {
    pub fn request_play_delay(&self) -> Duration {
        Duration::from_millis(self.request_play_delay_ms)
    }

    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `mgam.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();
        assert_eq!(config.retry.retries, 3);
        assert_eq!(config.retry.delay(), Duration::from_millis(500));
        assert_eq!(config.duplicate_voucher_retries, 3);
        assert_eq!(config.request_play_delay(), Duration::from_millis(250));
        assert_eq!(config.lockup.priority, LockupPriority::High);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
retry:
  retries: 5
  delay_ms: 100

duplicate_voucher_retries: 2

lockup:
  priority: critical
"#;

        let config = ProtocolConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.retries, 5);
        assert_eq!(config.retry.delay_ms, 100);
        assert_eq!(config.duplicate_voucher_retries, 2);
        assert_eq!(config.lockup.priority, LockupPriority::Critical);
        // Unset fields keep their defaults
        assert_eq!(config.request_play_delay_ms, 250);
    }

    #[test]
    fn test_parse_yaml_rejects_bad_types() {
        let result = ProtocolConfig::from_yaml("retry:\n  retries: many\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"retry:\n  retries: 7\n  delay_ms: 10\n")
            .unwrap();

        let config = ProtocolConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.retry.retries, 7);
        assert_eq!(config.retry.delay_ms, 10);
    }

    #[test]
    #[serial]
    fn test_load_missing_required_file_fails() {
        let result = ProtocolConfig::load(Some("/nonexistent/mgam-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"duplicate_voucher_retries: 1\n").unwrap();

        std::env::set_var("MGAM__DUPLICATE_VOUCHER_RETRIES", "6");
        let result = ProtocolConfig::load(Some(file.path().to_str().unwrap()));
        std::env::remove_var("MGAM__DUPLICATE_VOUCHER_RETRIES");

        assert_eq!(result.unwrap().duplicate_voucher_retries, 6);
    }
}

//! Application configuration.
//!
//! Loaded from a YAML file plus environment variables; env overrides file.

use std::time::Duration;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TALLY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TALLY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TALLY_LOG";
/// Environment variable for database URL.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Job harness settings.
    pub jobs: JobsConfig,
    /// Failure alerting settings.
    pub alerts: AlertConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var(DATABASE_URL_ENV_VAR).unwrap_or_default(),
            max_connections: 5,
        }
    }
}

/// Job harness settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Wall-clock budget for one run; also the lock expiry.
    pub timeout_secs: u64,
    pub lock_retry_interval_ms: u64,
    pub lock_max_retries: usize,
}

impl JobsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            lock_retry_interval_ms: 1000,
            lock_max_retries: 0,
        }
    }
}

/// Failure alerting settings. Alerts are dropped when no webhook is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overrides earlier:
    /// 1. `config.yaml` in the current directory (if it exists)
    /// 2. File specified by `path` (if provided)
    /// 3. File specified by `TALLY_CONFIG` (if set)
    /// 4. Environment variables with the `TALLY` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
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
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_scheduled_path() {
        let config = Config::for_test();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.jobs.timeout(), Duration::from_secs(3600));
        assert_eq!(config.jobs.lock_max_retries, 0);
        assert!(config.alerts.webhook_url.is_none());
    }
}

//! Configuration management for the erpops CLI.
//!
//! Settings come from `.erpops.toml` (or `--config`), then `ERPOPS_*`
//! environment variables, then command line flags. Database credentials
//! are never read from the file; they only come from the `DB_*` variables.

use erpops_core::{LogFormat, OpsError, Result};
use erpops_db::{PoolSettings, ReportFormat, normalize_identifier};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = ".erpops.toml";
pub const ENV_OUTPUT_FORMAT: &str = "ERPOPS_OUTPUT_FORMAT";
pub const ENV_LOG_FORMAT: &str = "ERPOPS_LOG_FORMAT";

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pool settings; the connection target itself comes from `DB_*`
    #[serde(default)]
    pub database: PoolSettings,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: ReportFormat,

    /// Schema used by `tables`, `describe` and `patch add-column`
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            schema: default_schema(),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| OpsError::config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load configuration with the following precedence:
    /// 1. Command line arguments (handled by the caller)
    /// 2. Environment variables
    /// 3. Configuration file (`path`, or `.erpops.toml` when present)
    /// 4. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Config::from_file(default_path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables read through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(format) = lookup(ENV_OUTPUT_FORMAT) {
            self.output.format = format.parse()?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;
        normalize_identifier(&self.output.schema)
            .map_err(|e| OpsError::config(format!("output.schema: {}", e)))?;
        Ok(())
    }
}

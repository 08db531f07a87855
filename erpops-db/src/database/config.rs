//! Database configuration types and utilities

use erpops_core::{OpsError, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

pub const ENV_HOST: &str = "DB_HOST";
pub const ENV_PORT: &str = "DB_PORT";
pub const ENV_NAME: &str = "DB_NAME";
pub const ENV_USER: &str = "DB_USER";
pub const ENV_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_CONNECT_TIMEOUT: &str = "DB_CONNECT_TIMEOUT";
pub const ENV_SSLMODE: &str = "DB_SSLMODE";

/// Pool behaviour that may come from the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connect timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// libpq style TLS mode (disable, allow, prefer, require, verify-ca, verify-full)
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout_seconds(),
            ssl_mode: default_ssl_mode(),
        }
    }
}

fn default_max_connections() -> u32 {
    1
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

impl PoolSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(OpsError::config("max_connections must be at least 1"));
        }
        if self.timeout_seconds == 0 {
            return Err(OpsError::config("connect timeout must be greater than 0"));
        }
        parse_ssl_mode(&self.ssl_mode)?;
        Ok(())
    }
}

fn parse_ssl_mode(mode: &str) -> Result<PgSslMode> {
    mode.parse::<PgSslMode>()
        .map_err(|e| OpsError::config(format!("Invalid ssl mode {:?}: {}", mode, e)))
}

/// Connection configuration, read once per process
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    password: String,
    pub pool: PoolSettings,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("pool", &self.pool)
            .finish()
    }
}

impl DatabaseConfig {
    /// Build a configuration from explicit values
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            pool: PoolSettings::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Read the process environment on top of the given pool settings
    pub fn from_env(pool: PoolSettings) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), pool)
    }

    /// Read configuration through `lookup`.
    ///
    /// Every `DB_*` connection variable is required; there are no built-in
    /// fallbacks for hosts or credentials.
    pub fn from_lookup<F>(lookup: F, mut pool: PoolSettings) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let host = required(ENV_HOST);
        let port = required(ENV_PORT);
        let database = required(ENV_NAME);
        let user = required(ENV_USER);
        // An empty password is legitimate under trust auth, but the variable must be set.
        let password = lookup(ENV_PASSWORD);
        if password.is_none() {
            missing.push(ENV_PASSWORD);
        }

        if !missing.is_empty() {
            return Err(OpsError::config(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| OpsError::config(format!("{} must be a port number, got {:?}", ENV_PORT, port)))?;

        if let Some(timeout) = lookup(ENV_CONNECT_TIMEOUT) {
            pool.timeout_seconds = timeout.trim().parse::<u64>().map_err(|_| {
                OpsError::config(format!("{} must be a number of seconds, got {:?}", ENV_CONNECT_TIMEOUT, timeout))
            })?;
        }
        if let Some(mode) = lookup(ENV_SSLMODE) {
            pool.ssl_mode = mode.trim().to_string();
        }
        pool.validate()?;

        Ok(Self {
            host,
            port,
            database,
            user,
            password: password.unwrap_or_default(),
            pool,
        })
    }

    /// Driver connect options for this configuration
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let ssl_mode = parse_ssl_mode(&self.pool.ssl_mode)?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode)
            .application_name("erpops"))
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pool.timeout_seconds)
    }

    /// `user@host:port/database`, safe to log
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

//! Database connection management

use crate::database::{config::DatabaseConfig, error::connection_error, error::query_error};
use erpops_core::{ConnectionError, Result};
use sqlx::{Connection as _, PgConnection, PgPool, postgres::PgPoolOptions};
use tracing::{debug, error, info};

/// Extra slack on top of the pool's own acquire timeout
const CONNECT_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// The process's single handle to the database
pub struct DatabaseConnection {
    pool: PgPool,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    /// Open a connection, bounded by the configured connect timeout.
    ///
    /// The first session is opened outside the pool, so a refused socket,
    /// a rejected login or a missing database keeps its own error class.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let timeout = config.connect_timeout();
        debug!(target_db = %config.target(), timeout_secs = timeout.as_secs(), "Connecting to PostgreSQL");

        let connect = async {
            let first = PgConnection::connect_with(&options).await?;
            first.close().await?;
            PgPoolOptions::new()
                .max_connections(config.pool.max_connections)
                .acquire_timeout(timeout)
                .connect_with(options.clone())
                .await
        };

        let pool = match tokio::time::timeout(timeout + CONNECT_GRACE, connect).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                error!(target_db = %config.target(), "Failed to connect to PostgreSQL: {}", e);
                return Err(connection_error(e, config));
            }
            Err(_) => {
                error!(target_db = %config.target(), "Connecting to PostgreSQL timed out");
                return Err(ConnectionError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        };

        info!(target_db = %config.target(), "PostgreSQL connection established");
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Check database health. A failed round trip is returned as the
    /// classified error rather than `false`.
    pub async fn health_check(&self) -> Result<bool> {
        let (one,): (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("PostgreSQL health check failed: {}", e);
                query_error(e)
            })?;
        debug!("PostgreSQL health check passed");
        Ok(one == 1)
    }

    /// Server version string, e.g. `PostgreSQL 16.2 on x86_64-pc-linux-gnu ...`
    pub async fn server_version(&self) -> Result<String> {
        let (version,): (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(version)
    }

    /// Release the connection. Consumes the handle so it closes exactly once.
    pub async fn close(self) {
        self.pool.close().await;
        debug!(target_db = %self.config.target(), "PostgreSQL connection closed");
    }
}

//! Database manager and coordination layer

use crate::database::{
    catalog::{CatalogService, ColumnInfo},
    config::DatabaseConfig,
    connection::DatabaseConnection,
    patch::{PatchPlan, PatchReport, SchemaPatcher},
    runner::{StatementOutcome, StatementRunner},
    statement::Statement,
};
use erpops_core::Result;
use sqlx::PgPool;

/// Database manager for high-level coordination
///
/// Owns the process's single connection and delegates every operation to
/// the runner, catalog and patcher services, which take the pool
/// explicitly.
pub struct DatabaseManager {
    connection: DatabaseConnection,
}

impl DatabaseManager {
    /// Connect using `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let connection = DatabaseConnection::new(config).await?;
        Ok(Self { connection })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        self.connection.pool()
    }

    pub fn config(&self) -> &DatabaseConfig {
        self.connection.config()
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        self.connection.health_check().await
    }

    pub async fn server_version(&self) -> Result<String> {
        self.connection.server_version().await
    }

    // Statements - delegate to StatementRunner

    pub async fn run_statement(&self, statement: &Statement) -> Result<StatementOutcome> {
        StatementRunner::run(self.pool(), statement).await
    }

    pub async fn execute_script(&self, sql: &str) -> Result<u64> {
        StatementRunner::execute_script(self.pool(), sql).await
    }

    // Catalog - delegate to CatalogService

    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        CatalogService::list_tables(self.pool(), schema).await
    }

    pub async fn describe_table(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        CatalogService::describe_table(self.pool(), schema, table).await
    }

    // Schema changes - delegate to SchemaPatcher

    pub async fn apply_patch(&self, plan: &PatchPlan) -> Result<PatchReport> {
        SchemaPatcher::apply(self.pool(), plan).await
    }

    /// Release the connection
    pub async fn close(self) {
        self.connection.close().await;
    }
}

//! Single-statement execution

use crate::database::{
    error::query_error,
    statement::{Param, Statement},
    value::{ResultSet, columns_of, decode_row},
};
use erpops_core::{OpsError, Result};
use sqlx::{Executor, PgPool, Statement as _};
use std::time::Instant;
use tracing::debug;

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement returns columns (SELECT, ... RETURNING, SHOW)
    Rows(ResultSet),
    /// The statement returns no columns; number of rows it touched
    Affected(u64),
}

impl StatementOutcome {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            StatementOutcome::Rows(result) => Some(result),
            StatementOutcome::Affected(_) => None,
        }
    }
}

/// Statement runner service
pub struct StatementRunner;

impl StatementRunner {
    /// Run one statement.
    ///
    /// The statement is prepared first, with each parameter's type declared,
    /// so a malformed statement fails before anything executes and its
    /// column list is known even when no rows come back.
    pub async fn run(pool: &PgPool, statement: &Statement) -> Result<StatementOutcome> {
        statement.validate()?;
        let started = Instant::now();

        let types: Vec<_> = statement.params().iter().map(Param::type_info).collect();
        let prepared = pool
            .prepare_with(statement.sql(), &types)
            .await
            .map_err(query_error)?;
        let columns = columns_of(prepared.columns());

        let expected = expected_params(&prepared);
        if expected != statement.params().len() {
            return Err(OpsError::validation(format!(
                "Statement expects {} parameter(s), {} given",
                expected,
                statement.params().len()
            )));
        }

        let mut query = prepared.query();
        for param in statement.params() {
            query = param.bind_to(query);
        }

        let outcome = if columns.is_empty() {
            let done = query.execute(pool).await.map_err(query_error)?;
            StatementOutcome::Affected(done.rows_affected())
        } else {
            let rows = query.fetch_all(pool).await.map_err(query_error)?;
            let mut result = ResultSet::new(columns);
            for row in &rows {
                result.push_row(decode_row(row))?;
            }
            StatementOutcome::Rows(result)
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            params = statement.params().len(),
            "Statement finished"
        );
        Ok(outcome)
    }

    /// Run a statement that must produce rows
    pub async fn fetch(pool: &PgPool, statement: &Statement) -> Result<ResultSet> {
        match Self::run(pool, statement).await? {
            StatementOutcome::Rows(result) => Ok(result),
            StatementOutcome::Affected(_) => Err(OpsError::validation(
                "Statement does not return rows",
            )),
        }
    }

    /// Run a statement that must produce at least one row; keeps only the first
    pub async fn fetch_one(pool: &PgPool, statement: &Statement) -> Result<ResultSet> {
        let result = Self::fetch(pool, statement).await?;
        if result.is_empty() {
            return Err(OpsError::not_found("row", "matching the statement"));
        }
        let mut first = ResultSet::new(result.columns().to_vec());
        first.push_row(result.rows()[0].values().to_vec())?;
        Ok(first)
    }

    /// Run an unparameterized, possibly multi-statement script.
    ///
    /// The script goes out as one simple-query message, so PostgreSQL runs it
    /// as a single implicit transaction unless the script issues its own
    /// `BEGIN`/`COMMIT`.
    pub async fn execute_script(pool: &PgPool, sql: &str) -> Result<u64> {
        if sql.trim().is_empty() {
            return Err(OpsError::validation("Script is empty"));
        }
        let done = sqlx::raw_sql(sql).execute(pool).await.map_err(query_error)?;
        debug!(rows_affected = done.rows_affected(), "Script finished");
        Ok(done.rows_affected())
    }
}

fn expected_params(prepared: &sqlx::postgres::PgStatement<'_>) -> usize {
    match prepared.parameters() {
        Some(sqlx::Either::Left(types)) => types.len(),
        Some(sqlx::Either::Right(count)) => count,
        None => 0,
    }
}

//! Schema inspection through `information_schema`

use crate::database::{
    error::query_error,
    value::{Column, ResultSet, Value},
};
use erpops_core::{OpsError, Result};
use serde::Serialize;
use sqlx::{PgPool, Row};

/// Column as described by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub position: i32,
}

/// Catalog service for schema lookups
pub struct CatalogService;

impl CatalogService {
    /// Base tables in `schema`, sorted by name
    pub async fn list_tables(pool: &PgPool, schema: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = sqlx::query(query)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(query_error))
            .collect()
    }

    /// Columns of `schema.table` in ordinal order.
    ///
    /// Returns `NotFound` when the table does not exist.
    pub async fn describe_table(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let query = r#"
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   (is_nullable = 'YES') AS nullable,
                   column_default::text AS column_default,
                   ordinal_position::int4 AS ordinal_position
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(schema)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(query_error)?;

        if rows.is_empty() && !Self::table_exists(pool, schema, table).await? {
            return Err(OpsError::not_found("table", format!("{}.{}", schema, table)));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnInfo {
                name: row.try_get("column_name").map_err(query_error)?,
                data_type: row.try_get("data_type").map_err(query_error)?,
                nullable: row.try_get("nullable").map_err(query_error)?,
                default: row.try_get("column_default").map_err(query_error)?,
                position: row.try_get("ordinal_position").map_err(query_error)?,
            });
        }
        Ok(columns)
    }

    pub async fn table_exists(pool: &PgPool, schema: &str, table: &str) -> Result<bool> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;

        let (exists,): (bool,) = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(query_error)?;
        Ok(exists)
    }

    pub async fn column_exists(pool: &PgPool, schema: &str, table: &str, column: &str) -> Result<bool> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            )
        "#;

        let (exists,): (bool,) = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await
            .map_err(query_error)?;
        Ok(exists)
    }
}

/// Table names as a one-column result for the reporter
pub fn tables_result(tables: &[String]) -> Result<ResultSet> {
    let mut result = ResultSet::new(vec![Column::new("table_name", "TEXT")]);
    for table in tables {
        result.push_row(vec![Value::Text(table.clone())])?;
    }
    Ok(result)
}

/// Column descriptions as a result for the reporter
pub fn columns_result(columns: &[ColumnInfo]) -> Result<ResultSet> {
    let mut result = ResultSet::new(vec![
        Column::new("position", "INT4"),
        Column::new("column_name", "TEXT"),
        Column::new("data_type", "TEXT"),
        Column::new("nullable", "BOOL"),
        Column::new("default", "TEXT"),
    ]);
    for column in columns {
        result.push_row(vec![
            Value::Int(column.position.into()),
            Value::Text(column.name.clone()),
            Value::Text(column.data_type.clone()),
            Value::Bool(column.nullable),
            column.default.clone().map(Value::Text).unwrap_or(Value::Null),
        ])?;
    }
    Ok(result)
}

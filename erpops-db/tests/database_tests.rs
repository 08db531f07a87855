//! Database integration tests
//!
//! These tests require a running PostgreSQL database. They are skipped
//! unless `ERPOPS_TEST_DATABASE=1` is set together with the `DB_*`
//! connection variables. Everything they create lives in the
//! `erpops_test` schema, which is dropped afterwards.

use erpops_core::{ConnectionError, OpsError, QueryError};
use erpops_db::{
    ColumnOutcome, ColumnSpec, DatabaseConfig, DatabaseManager, Param, PatchPlan, PoolSettings,
    Statement, StatementOutcome, StatementRunner, TablePatch, Value,
};
use serial_test::serial;

const SCHEMA: &str = "erpops_test";

const FIXTURE: &str = r#"
DROP SCHEMA IF EXISTS erpops_test CASCADE;
CREATE SCHEMA erpops_test;
CREATE TABLE erpops_test.bus (id SERIAL PRIMARY KEY, registration TEXT NOT NULL);
CREATE TABLE erpops_test.staff (id SERIAL PRIMARY KEY, name TEXT, salary NUMERIC(12, 2));
INSERT INTO erpops_test.bus (registration) VALUES ('KA-01-F-1234');
INSERT INTO erpops_test.staff (name, salary) VALUES ('A. Rao', 48250.50), ('S. Menon', NULL);
"#;

/// Connect and load the fixture, or `None` when live tests are disabled
async fn create_test_manager() -> anyhow::Result<Option<DatabaseManager>> {
    if std::env::var("ERPOPS_TEST_DATABASE").as_deref() != Ok("1") {
        eprintln!("skipping: set ERPOPS_TEST_DATABASE=1 to run live database tests");
        return Ok(None);
    }
    let config = DatabaseConfig::from_env(PoolSettings::default())?;
    let manager = DatabaseManager::connect(&config).await?;
    manager.execute_script(FIXTURE).await?;
    Ok(Some(manager))
}

async fn cleanup(manager: DatabaseManager) -> anyhow::Result<()> {
    manager
        .execute_script("DROP SCHEMA IF EXISTS erpops_test CASCADE")
        .await?;
    manager.close().await;
    Ok(())
}

fn route_pdf_plan() -> PatchPlan {
    PatchPlan::single(
        TablePatch::new("bus")
            .in_schema(SCHEMA)
            .column(ColumnSpec::new("route_pdf", "TEXT")),
    )
}

#[tokio::test]
#[serial]
async fn test_add_column_twice_is_noop() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let first = manager.apply_patch(&route_pdf_plan()).await?;
    assert_eq!(first.added(), 1);
    assert!(!first.has_failures());

    let second = manager.apply_patch(&route_pdf_plan()).await?;
    assert_eq!(second.already_present(), 1);
    assert!(second.is_noop());

    let columns = manager.describe_table(SCHEMA, "bus").await?;
    let route_pdf = columns
        .iter()
        .find(|column| column.name == "route_pdf")
        .expect("route_pdf column");
    assert_eq!(route_pdf.data_type, "text");
    assert!(route_pdf.nullable);
    assert_eq!(columns.iter().filter(|c| c.name == "route_pdf").count(), 1);

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_select_returns_row_keyed_by_column() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let outcome = manager
        .run_statement(&Statement::new("SELECT id FROM erpops_test.staff ORDER BY id LIMIT 1"))
        .await?;
    let result = outcome.rows().expect("rows");
    assert_eq!(result.len(), 1);
    assert_eq!(result.columns()[0].name, "id");
    assert_eq!(result.value(0, "id"), Some(&Value::Int(1)));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_empty_select_keeps_columns() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let outcome = manager
        .run_statement(&Statement::new("SELECT id, name FROM erpops_test.staff WHERE false"))
        .await?;
    let result = outcome.rows().expect("rows");
    assert!(result.is_empty());
    assert_eq!(result.columns().len(), 2);

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_fetch_one_requires_a_row() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let first = StatementRunner::fetch_one(
        manager.pool(),
        &Statement::new("SELECT name FROM erpops_test.staff ORDER BY id"),
    )
    .await?;
    assert_eq!(first.len(), 1);
    assert_eq!(first.value(0, "name"), Some(&Value::Text("A. Rao".to_string())));

    let none = StatementRunner::fetch_one(
        manager.pool(),
        &Statement::new("SELECT name FROM erpops_test.staff WHERE id = $1").bind(Param::Int(404)),
    )
    .await
    .unwrap_err();
    assert!(matches!(none, OpsError::NotFound(_)));

    let not_rows = StatementRunner::fetch(manager.pool(), &Statement::new("UPDATE erpops_test.staff SET name = name"))
        .await
        .unwrap_err();
    assert!(matches!(not_rows, OpsError::Validation { .. }));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_missing_column_is_named_in_error() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let error = manager
        .run_statement(&Statement::new("SELECT photo_url FROM erpops_test.staff"))
        .await
        .unwrap_err();
    match &error {
        OpsError::Query(query_error @ QueryError::Database { message, .. }) => {
            assert_eq!(query_error.code(), Some("42703"));
            assert!(message.contains("photo_url"), "{message}");
        }
        other => panic!("expected a query error, got {other:?}"),
    }
    assert_eq!(error.exit_code(), 4);

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_invalid_statement_yields_no_rows() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let result = manager
        .run_statement(&Statement::new("SELEC id FROM erpops_test.staff"))
        .await;
    match result {
        Err(OpsError::Query(error)) => assert_eq!(error.code(), Some("42601")),
        other => panic!("expected a syntax error, got {other:?}"),
    }

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_parameters_and_affected_rows() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let outcome = manager
        .run_statement(
            &Statement::new("UPDATE erpops_test.staff SET name = $1 WHERE id = $2")
                .bind(Param::Text("A. Rao-Kulkarni".to_string()))
                .bind(Param::Int(1)),
        )
        .await?;
    assert_eq!(outcome, StatementOutcome::Affected(1));

    let mismatch = manager
        .run_statement(&Statement::new("SELECT name FROM erpops_test.staff WHERE id = $1"))
        .await
        .unwrap_err();
    assert!(matches!(mismatch, OpsError::Validation { .. }));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_numeric_and_null_decoding() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let outcome = manager
        .run_statement(&Statement::new("SELECT salary FROM erpops_test.staff ORDER BY id"))
        .await?;
    let result = outcome.rows().expect("rows");
    assert_eq!(result.value(0, "salary"), Some(&Value::Numeric("48250.50".to_string())));
    assert_eq!(result.value(1, "salary"), Some(&Value::Null));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_catalog_lookups() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let tables = manager.list_tables(SCHEMA).await?;
    assert_eq!(tables, vec!["bus".to_string(), "staff".to_string()]);

    let missing = manager.describe_table(SCHEMA, "hostel").await.unwrap_err();
    assert!(matches!(missing, OpsError::NotFound(_)));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_failed_column_does_not_stop_the_rest() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    // NOT NULL without a default cannot be added to a table that has rows.
    let plan = PatchPlan::single(
        TablePatch::new("staff")
            .in_schema(SCHEMA)
            .column(ColumnSpec::new("employee_code", "TEXT").not_null())
            .column(ColumnSpec::new("photo_url", "TEXT")),
    );
    let report = manager.apply_patch(&plan).await?;
    assert!(matches!(report.entries[0].outcome, ColumnOutcome::Failed(_)));
    assert_eq!(report.entries[1].outcome, ColumnOutcome::Added);
    assert!(matches!(report.into_result(), Err(OpsError::Patch { failed: 1 })));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_create_if_missing_then_add() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    let plan = PatchPlan::single(
        TablePatch::new("no_dues")
            .in_schema(SCHEMA)
            .create_if_missing()
            .column(ColumnSpec::new("student_id", "INTEGER").not_null())
            .column(ColumnSpec::new("cleared", "BOOLEAN").with_default("false")),
    );
    let created = manager.apply_patch(&plan).await?;
    assert_eq!(created.tables_created, vec!["erpops_test.no_dues".to_string()]);
    assert_eq!(created.added(), 2);

    let rerun = manager.apply_patch(&plan).await?;
    assert!(rerun.is_noop());
    assert_eq!(rerun.already_present(), 2);

    let absent = PatchPlan::single(
        TablePatch::new("hostel")
            .in_schema(SCHEMA)
            .column(ColumnSpec::new("warden", "TEXT")),
    );
    let report = manager.apply_patch(&absent).await?;
    assert_eq!(report.failures(), 1);

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_enum_domain_array_interval_inet_decoding() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    manager
        .execute_script(
            "CREATE TYPE erpops_test.dues_status AS ENUM ('pending', 'cleared');
             CREATE DOMAIN erpops_test.roll_no AS TEXT CHECK (VALUE <> '');",
        )
        .await?;

    let outcome = manager
        .run_statement(&Statement::new(
            "SELECT 'cleared'::erpops_test.dues_status AS status,
                    '21CS042'::erpops_test.roll_no AS roll,
                    ARRAY['lib', 'hostel'] AS clearances,
                    ARRAY[1, NULL, 3]::int8[] AS fines,
                    interval '2 days' AS grace,
                    '10.0.0.1'::inet AS lab_host,
                    '192.168.4.0/24'::cidr AS lab_net",
        ))
        .await?;
    let result = outcome.rows().expect("rows");
    assert_eq!(result.value(0, "status"), Some(&Value::Text("cleared".to_string())));
    assert_eq!(result.value(0, "roll"), Some(&Value::Text("21CS042".to_string())));
    assert_eq!(
        result.value(0, "clearances"),
        Some(&Value::Json(serde_json::json!(["lib", "hostel"])))
    );
    assert_eq!(
        result.value(0, "fines"),
        Some(&Value::Json(serde_json::json!([1, null, 3])))
    );
    assert_eq!(result.value(0, "grace"), Some(&Value::Text("2 days".to_string())));
    assert_eq!(result.value(0, "lab_host"), Some(&Value::Text("10.0.0.1".to_string())));
    assert_eq!(result.value(0, "lab_net"), Some(&Value::Text("192.168.4.0/24".to_string())));

    cleanup(manager).await
}

#[tokio::test]
#[serial]
async fn test_health_check_reports_a_lost_pool_as_error() -> anyhow::Result<()> {
    let Some(manager) = create_test_manager().await? else {
        return Ok(());
    };

    assert!(manager.health_check().await?);
    manager
        .execute_script("DROP SCHEMA IF EXISTS erpops_test CASCADE")
        .await?;

    manager.pool().close().await;
    let error = manager.health_check().await.unwrap_err();
    assert!(
        matches!(error, OpsError::Connection(ConnectionError::Rejected { .. })),
        "{error:?}"
    );
    assert_eq!(error.exit_code(), 3);
    Ok(())
}

//! Translation of driver errors into the erpops taxonomy

use crate::database::config::DatabaseConfig;
use erpops_core::{ConnectionError, OpsError, QueryError};
use sqlx::postgres::PgDatabaseError;

/// Coarse meaning of a SQLSTATE code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlStateClass {
    /// Class 28: invalid authorization specification
    Authentication,
    /// 3D000: invalid catalog name
    MissingDatabase,
    /// Classes 08, 53 and 57: the session itself is unusable
    Connection,
    /// Everything else is about the statement
    Statement,
}

pub(crate) fn classify_sqlstate(code: Option<&str>) -> SqlStateClass {
    match code {
        Some("3D000") => SqlStateClass::MissingDatabase,
        Some(code) if code.starts_with("28") => SqlStateClass::Authentication,
        Some(code) if code.starts_with("08") || code.starts_with("53") || code.starts_with("57") => {
            SqlStateClass::Connection
        }
        _ => SqlStateClass::Statement,
    }
}

/// Map a failure raised while opening the session
pub(crate) fn connection_error(error: sqlx::Error, config: &DatabaseConfig) -> OpsError {
    match error {
        sqlx::Error::Database(db_error) => {
            let reason = db_error.message().to_string();
            let code = db_error.code();
            match classify_sqlstate(code.as_deref()) {
                SqlStateClass::Authentication => ConnectionError::AuthenticationRejected {
                    user: config.user.clone(),
                    reason,
                }
                .into(),
                SqlStateClass::MissingDatabase => ConnectionError::DatabaseMissing {
                    database: config.database.clone(),
                }
                .into(),
                _ => ConnectionError::Rejected { reason }.into(),
            }
        }
        sqlx::Error::Io(e) => ConnectionError::Unreachable {
            host: config.host.clone(),
            port: config.port,
            reason: e.to_string(),
        }
        .into(),
        sqlx::Error::Tls(e) => ConnectionError::Unreachable {
            host: config.host.clone(),
            port: config.port,
            reason: format!("TLS: {}", e),
        }
        .into(),
        sqlx::Error::PoolTimedOut => ConnectionError::Timeout {
            timeout_ms: config.connect_timeout().as_millis() as u64,
        }
        .into(),
        sqlx::Error::Configuration(e) => OpsError::config(e.to_string()),
        other => ConnectionError::Rejected {
            reason: other.to_string(),
        }
        .into(),
    }
}

/// Map a failure raised while running a statement
pub(crate) fn query_error(error: sqlx::Error) -> OpsError {
    match error {
        sqlx::Error::Database(db_error) => {
            let code = db_error.code().map(|code| code.into_owned());
            if classify_sqlstate(code.as_deref()) == SqlStateClass::Connection {
                return ConnectionError::Rejected {
                    reason: db_error.message().to_string(),
                }
                .into();
            }
            let (detail, hint) = match db_error.try_downcast_ref::<PgDatabaseError>() {
                Some(pg) => (pg.detail().map(str::to_string), pg.hint().map(str::to_string)),
                None => (None, None),
            };
            QueryError::Database {
                code,
                message: db_error.message().to_string(),
                detail,
                hint,
            }
            .into()
        }
        sqlx::Error::Io(e) => ConnectionError::Rejected {
            reason: format!("connection lost: {}", e),
        }
        .into(),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => ConnectionError::Rejected {
            reason: "no connection available".to_string(),
        }
        .into(),
        sqlx::Error::ColumnDecode { index, source } => QueryError::Decode {
            column: index,
            message: source.to_string(),
        }
        .into(),
        sqlx::Error::RowNotFound => OpsError::not_found("row", "matching the statement"),
        other => QueryError::driver(other.to_string()).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DatabaseConfig {
        DatabaseConfig::new("10.0.0.5", 5432, "erp", "erp_admin", "pw")
    }

    #[test]
    fn test_sqlstate_classes() {
        assert_eq!(classify_sqlstate(Some("28P01")), SqlStateClass::Authentication);
        assert_eq!(classify_sqlstate(Some("28000")), SqlStateClass::Authentication);
        assert_eq!(classify_sqlstate(Some("3D000")), SqlStateClass::MissingDatabase);
        assert_eq!(classify_sqlstate(Some("08006")), SqlStateClass::Connection);
        assert_eq!(classify_sqlstate(Some("53300")), SqlStateClass::Connection);
        assert_eq!(classify_sqlstate(Some("42703")), SqlStateClass::Statement);
        assert_eq!(classify_sqlstate(Some("42601")), SqlStateClass::Statement);
        assert_eq!(classify_sqlstate(None), SqlStateClass::Statement);
    }

    #[test]
    fn test_refused_socket_is_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = connection_error(sqlx::Error::Io(io), &config());
        match error {
            OpsError::Connection(ConnectionError::Unreachable { host, port, .. }) => {
                assert_eq!(host, "10.0.0.5");
                assert_eq!(port, 5432);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pool_timeout_is_bounded_timeout() {
        let error = connection_error(sqlx::Error::PoolTimedOut, &config());
        assert!(matches!(
            error,
            OpsError::Connection(ConnectionError::Timeout { timeout_ms: 10_000 })
        ));
    }

    #[test]
    fn test_statement_failures_are_query_errors() {
        let error = query_error(sqlx::Error::Protocol("unexpected message".to_string()));
        assert!(matches!(error, OpsError::Query(QueryError::Driver { .. })));

        let error = query_error(sqlx::Error::ColumnDecode {
            index: "\"amount\"".to_string(),
            source: "bad numeric".into(),
        });
        assert!(matches!(error, OpsError::Query(QueryError::Decode { .. })));
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn test_lost_connection_during_query_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(query_error(sqlx::Error::Io(io)), OpsError::Connection(_)));
        assert!(matches!(
            query_error(sqlx::Error::RowNotFound),
            OpsError::NotFound(_)
        ));
    }
}

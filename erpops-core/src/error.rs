use thiserror::Error;

/// Main result type for erpops operations
pub type Result<T> = std::result::Result<T, OpsError>;

/// Main error type for erpops operations
#[derive(Debug, Error)]
pub enum OpsError {
    /// The database could not be reached or refused the session
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A statement was rejected or its result could not be read
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// An expected row or object is absent
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// One or more schema changes in a patch run failed
    #[error("Schema patch failed for {failed} column(s)")]
    Patch { failed: usize },

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal errors (should not normally occur)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures while opening a session with the database
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Host could not be reached (DNS, refused, TLS)
    #[error("cannot reach {host}:{port}: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    /// Credentials were rejected by the server
    #[error("authentication rejected for user {user}: {reason}")]
    AuthenticationRejected { user: String, reason: String },

    /// The named database does not exist on the server
    #[error("database \"{database}\" does not exist")]
    DatabaseMissing { database: String },

    /// Connect did not complete within the configured bound
    #[error("connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Any other refusal from the server side
    #[error("connection rejected: {reason}")]
    Rejected { reason: String },
}

/// Failures of a single statement
#[derive(Debug, Error)]
pub enum QueryError {
    /// Diagnostic reported by the database itself
    #[error("{message}{}", format_code(.code))]
    Database {
        code: Option<String>,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    /// A row came back but could not be read
    #[error("cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    /// Driver or protocol level failure after the session was established
    #[error("{message}")]
    Driver { message: String },
}

fn format_code(code: &Option<String>) -> String {
    match code {
        Some(code) => format!(" (SQLSTATE {})", code),
        None => String::new(),
    }
}

/// Expected object was absent
#[derive(Debug, Error)]
#[error("{entity} {key}")]
pub struct NotFoundError {
    pub entity: String,
    pub key: String,
}

/// Convenience methods for creating specific errors
impl OpsError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound(NotFoundError::new(entity, key))
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::Validation { .. } => 2,
            Self::Connection(_) => 3,
            Self::Query(_) => 4,
            Self::NotFound(_) => 5,
            Self::Patch { .. } => 6,
            Self::Io(_) | Self::Internal { .. } => 1,
        }
    }
}

impl QueryError {
    /// Create a database diagnostic error with only a message
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            code: None,
            message: message.into(),
            detail: None,
            hint: None,
        }
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// SQLSTATE code if the database reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl NotFoundError {
    pub fn new(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

impl From<serde_json::Error> for OpsError {
    fn from(error: serde_json::Error) -> Self {
        OpsError::Internal {
            message: format!("Serialization error: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let validation_error = OpsError::validation("Invalid input");
        assert!(matches!(validation_error, OpsError::Validation { .. }));

        let not_found = OpsError::not_found("table", "public.bus");
        assert!(matches!(not_found, OpsError::NotFound(_)));
        assert_eq!(not_found.to_string(), "Not found: table public.bus");
    }

    #[test]
    fn test_error_conversion() {
        let conn_err = ConnectionError::Timeout { timeout_ms: 500 };
        let main_err: OpsError = conn_err.into();
        assert!(matches!(main_err, OpsError::Connection(_)));
        assert_eq!(main_err.exit_code(), 3);
    }

    #[test]
    fn test_query_error_display_keeps_native_message() {
        let error = QueryError::Database {
            code: Some("42703".to_string()),
            message: "column \"nope\" does not exist".to_string(),
            detail: None,
            hint: None,
        };
        assert_eq!(
            error.to_string(),
            "column \"nope\" does not exist (SQLSTATE 42703)"
        );
        assert_eq!(error.code(), Some("42703"));

        let plain = QueryError::database("syntax error");
        assert_eq!(plain.to_string(), "syntax error");
        assert_eq!(plain.code(), None);
    }

    #[test]
    fn test_exit_codes_are_nonzero() {
        let errors = [
            OpsError::config("missing DB_HOST"),
            OpsError::validation("bad identifier"),
            QueryError::driver("closed").into(),
            OpsError::not_found("row", "staff"),
            OpsError::Patch { failed: 2 },
            OpsError::internal("boom"),
        ];
        for error in &errors {
            assert_ne!(error.exit_code(), 0, "{error}");
        }
        assert_eq!(OpsError::config("x").exit_code(), 2);
        assert_eq!(OpsError::Patch { failed: 1 }.exit_code(), 6);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "plan.toml");
        let error: OpsError = io_error.into();
        assert!(matches!(error, OpsError::Io(_)));
        assert_eq!(error.exit_code(), 1);
    }
}

use serde::{Deserialize, Serialize};
use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (text, json, compact)
    pub format: LogFormat,
    /// Whether to include file and line numbers
    pub include_location: bool,
    /// Whether to include span enter/exit events
    pub include_spans: bool,
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact text format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::OpsError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(crate::OpsError::validation(format!(
                "Invalid log format: {}. Valid formats are: text, json, compact",
                s
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            include_location: false,
            include_spans: false,
        }
    }
}

/// Initialize logging with the given configuration.
///
/// Everything goes to stderr; stdout is reserved for reports.
pub fn init_logging(config: &LogConfig) -> crate::Result<()> {
    parse_log_level(&config.level)?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let quiet_driver = "sqlx=warn".parse().map_err(|e| {
                crate::OpsError::config(format!("Invalid log directive: {}", e))
            })?;
            EnvFilter::new(&config.level).add_directive(quiet_driver)
        }
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match config.format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(config.include_location)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| crate::OpsError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        "Logging initialized"
    );

    Ok(())
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> crate::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(crate::OpsError::validation(format!(
            "Invalid log level: {}. Valid levels are: trace, debug, info, warn, error",
            level
        ))),
    }
}

/// Correlation ID tying together the log lines of one invocation
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new correlation ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured logging context for one operator command
pub struct LogContext {
    correlation_id: CorrelationId,
    operation: String,
    component: String,
}

impl LogContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            operation: operation.into(),
            component: component.into(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Create a tracing span for this context
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            correlation_id = %self.correlation_id,
            operation = %self.operation,
            component = %self.component
        )
    }

    pub fn info(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::info!("{}", message);
    }

    pub fn warn(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::warn!("{}", message);
    }

    pub fn error(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::error!("{}", message);
    }

    pub fn debug(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::debug!("{}", message);
    }
}

/// Configure logging for the command-line tool.
///
/// A valid `RUST_LOG` level wins over `verbose`.
pub fn init_cli_logging(verbose: bool, format: LogFormat) -> crate::Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let config = LogConfig {
        level: std::env::var("RUST_LOG")
            .ok()
            .filter(|level| parse_log_level(level).is_ok())
            .unwrap_or_else(|| default_level.to_string()),
        format,
        include_location: verbose,
        include_spans: false,
    };
    init_logging(&config)
}

pub mod error;
pub mod logging;

pub use error::{ConnectionError, NotFoundError, OpsError, QueryError, Result};
pub use logging::{
    init_cli_logging, init_logging, CorrelationId, LogConfig, LogContext, LogFormat,
};

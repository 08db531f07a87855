//! Statements and their bound parameters

use erpops_core::{OpsError, Result};
use sqlx::postgres::{PgArguments, PgTypeInfo, Postgres, types::Oid};
use sqlx::query::Query;
use sqlx::Type;

/// A single bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Param {
    /// Type declared for this parameter when the statement is prepared.
    ///
    /// `Null` is left unspecified so the server infers it from context.
    pub(crate) fn type_info(&self) -> PgTypeInfo {
        match self {
            Param::Null => PgTypeInfo::with_oid(Oid(0)),
            Param::Bool(_) => <bool as Type<Postgres>>::type_info(),
            Param::Int(_) => <i64 as Type<Postgres>>::type_info(),
            Param::Float(_) => <f64 as Type<Postgres>>::type_info(),
            Param::Text(_) => <String as Type<Postgres>>::type_info(),
            Param::Json(_) => <sqlx::types::Json<serde_json::Value> as Type<Postgres>>::type_info(),
        }
    }

    /// Attach this parameter as the next positional argument of `query`
    pub(crate) fn bind_to<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Param::Null => query.bind(None::<String>),
            Param::Bool(value) => query.bind(*value),
            Param::Int(value) => query.bind(*value),
            Param::Float(value) => query.bind(*value),
            Param::Text(value) => query.bind(value.clone()),
            Param::Json(value) => query.bind(sqlx::types::Json(value.clone())),
        }
    }
}

/// Parses the command-line form of a parameter.
///
/// `int:42`, `float:1.5`, `bool:true`, `json:{..}`, `text:abc` and bare
/// `null`; anything else is text as written.
impl std::str::FromStr for Param {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "null" {
            return Ok(Param::Null);
        }
        let Some((kind, value)) = s.split_once(':') else {
            return Ok(Param::Text(s.to_string()));
        };
        match kind {
            "int" => value.parse().map(Param::Int).map_err(|e| invalid(kind, value, e)),
            "float" => value.parse().map(Param::Float).map_err(|e| invalid(kind, value, e)),
            "bool" => value.parse().map(Param::Bool).map_err(|e| invalid(kind, value, e)),
            "json" => serde_json::from_str(value)
                .map(Param::Json)
                .map_err(|e| invalid(kind, value, e)),
            "text" => Ok(Param::Text(value.to_string())),
            _ => Ok(Param::Text(s.to_string())),
        }
    }
}

fn invalid(kind: &str, value: &str, error: impl std::fmt::Display) -> OpsError {
    OpsError::validation(format!("Invalid {} parameter {:?}: {}", kind, value, error))
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Null => write!(f, "null"),
            Param::Bool(value) => write!(f, "bool:{}", value),
            Param::Int(value) => write!(f, "int:{}", value),
            Param::Float(value) => write!(f, "float:{}", value),
            Param::Text(value) => write!(f, "text:{}", value),
            Param::Json(value) => write!(f, "json:{}", value),
        }
    }
}

/// SQL text plus ordered parameters (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter
    pub fn bind(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Reject statements that cannot possibly run
    pub fn validate(&self) -> Result<()> {
        if self.sql.trim().trim_end_matches(';').trim().is_empty() {
            return Err(OpsError::validation("Statement is empty"));
        }
        Ok(())
    }
}

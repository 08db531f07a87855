//! Idempotent, additive schema changes
//!
//! Every change is guarded twice: the catalog is consulted first so an
//! existing column is reported and skipped, and the DDL itself carries
//! `IF NOT EXISTS` so a concurrent run cannot turn the race into a
//! duplicate-column error. There is no migration ledger and no transaction
//! around a run; each column stands on its own.

use crate::database::{
    catalog::CatalogService,
    runner::StatementRunner,
    statement::Statement,
    value::{Column, ResultSet, Value},
};
use erpops_core::{OpsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

const MAX_IDENTIFIER_BYTES: usize = 63;

fn default_nullable() -> bool {
    true
}

fn default_schema() -> String {
    "public".to_string()
}

/// Validate a SQL identifier and fold it the way PostgreSQL folds unquoted names
pub fn normalize_identifier(name: &str) -> Result<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid_start || !valid_rest {
        return Err(OpsError::validation(format!(
            "Invalid identifier {:?}: use letters, digits, '_' or '$', not starting with a digit",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(OpsError::validation(format!(
            "Identifier {:?} is longer than {} bytes",
            name, MAX_IDENTIFIER_BYTES
        )));
    }
    Ok(name.to_ascii_lowercase())
}

/// Keywords that open a further `ALTER TABLE` action
const ALTER_ACTION_WORDS: &[&str] = &["ADD", "ALTER", "DROP", "RENAME", "OWNER", "DISABLE", "ENABLE"];

/// Upper-cased words of `text` that sit outside quotes and brackets.
///
/// Fails on a comma at that level, since it would end the column definition
/// and begin another action, and on unbalanced quotes or parentheses.
fn top_level_words(text: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?,
            ',' if depth == 0 => return Err("comma outside parentheses"),
            _ => {}
        }
        if depth == 0 && quote.is_none() && (c.is_ascii_alphanumeric() || c == '_') {
            word.push(c.to_ascii_uppercase());
        } else if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
    }

    if quote.is_some() {
        return Err("unterminated quote");
    }
    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    if !word.is_empty() {
        words.push(word);
    }
    Ok(words)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// One column to add
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// SQL default expression, e.g. `0` or `now()`
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnSpec {
    /// Nullable column without a default
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(expression.into());
        self
    }

    /// Parse the `NAME:TYPE` command-line form
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, sql_type) = spec.split_once(':').ok_or_else(|| {
            OpsError::validation(format!("Column {:?} must be written NAME:TYPE", spec))
        })?;
        let column = Self::new(name.trim(), sql_type.trim());
        column.validate()?;
        Ok(column)
    }

    pub fn validate(&self) -> Result<()> {
        normalize_identifier(&self.name)?;

        let sql_type = self.sql_type.trim();
        let type_ok = !sql_type.is_empty()
            && sql_type.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ',' | '[' | ']')
            });
        if !type_ok {
            return Err(OpsError::validation(format!(
                "Invalid type {:?} for column {}",
                self.sql_type, self.name
            )));
        }
        top_level_words(sql_type).map_err(|reason| {
            OpsError::validation(format!(
                "Invalid type {:?} for column {}: {}",
                self.sql_type, self.name, reason
            ))
        })?;

        if let Some(default) = &self.default {
            self.validate_default(default)?;
        }
        Ok(())
    }

    fn validate_default(&self, default: &str) -> Result<()> {
        let invalid = |reason: &str| {
            OpsError::validation(format!(
                "Invalid default {:?} for column {}: {}",
                default, self.name, reason
            ))
        };
        if default.trim().is_empty() {
            return Err(invalid("empty expression"));
        }
        if default.contains(';') || default.contains("--") || default.contains("/*") {
            return Err(invalid("statement separators and comments are not allowed"));
        }
        let words = top_level_words(default).map_err(invalid)?;
        if let Some(word) = words.iter().find(|word| ALTER_ACTION_WORDS.contains(&word.as_str())) {
            return Err(invalid(&format!("{} would start another table action", word)));
        }
        Ok(())
    }

    /// Folded column name
    pub fn column_name(&self) -> Result<String> {
        normalize_identifier(&self.name)
    }

    /// Column definition as used in ADD COLUMN / CREATE TABLE
    pub fn definition(&self) -> Result<String> {
        self.validate()?;
        let mut definition = format!("{} {}", quote(&self.column_name()?), self.sql_type.trim());
        if !self.nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(default.trim());
        }
        Ok(definition)
    }
}

/// Changes for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePatch {
    #[serde(rename = "name")]
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Create the table with `columns` when it does not exist yet
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl TablePatch {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: default_schema(),
            create_if_missing: false,
            columns: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn create_if_missing(mut self) -> Self {
        self.create_if_missing = true;
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn validate(&self) -> Result<()> {
        normalize_identifier(&self.schema)?;
        normalize_identifier(&self.table)?;
        let mut seen = HashSet::new();
        for column in &self.columns {
            column.validate()?;
            if !seen.insert(column.column_name()?) {
                return Err(OpsError::validation(format!(
                    "Column {} listed twice for table {}",
                    column.name, self.table
                )));
            }
        }
        Ok(())
    }

    /// `schema.table`, folded and unquoted
    pub fn display_name(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            normalize_identifier(&self.schema)?,
            normalize_identifier(&self.table)?
        ))
    }

    fn qualified_name(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            quote(&normalize_identifier(&self.schema)?),
            quote(&normalize_identifier(&self.table)?)
        ))
    }

    pub fn add_column_sql(&self, column: &ColumnSpec) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
            self.qualified_name()?,
            column.definition()?
        ))
    }

    pub fn create_table_sql(&self) -> Result<String> {
        let definitions = self
            .columns
            .iter()
            .map(ColumnSpec::definition)
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified_name()?,
            definitions.join(", ")
        ))
    }
}

/// A set of table patches, usually read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPlan {
    #[serde(default)]
    pub tables: Vec<TablePatch>,
}

impl PatchPlan {
    pub fn single(table: TablePatch) -> Self {
        Self {
            tables: vec![table],
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let plan: PatchPlan = toml::from_str(content)
            .map_err(|e| OpsError::validation(format!("Invalid patch plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.iter().all(|table| table.columns.is_empty()) {
            return Err(OpsError::validation("Patch plan contains no columns"));
        }
        for table in &self.tables {
            table.validate()?;
        }
        Ok(())
    }
}

/// Result of one column change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum ColumnOutcome {
    Added,
    AlreadyPresent,
    Failed(String),
}

impl std::fmt::Display for ColumnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnOutcome::Added => write!(f, "added"),
            ColumnOutcome::AlreadyPresent => write!(f, "already present"),
            ColumnOutcome::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchEntry {
    pub table: String,
    pub column: String,
    pub outcome: ColumnOutcome,
}

/// Per-column outcomes of a patch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub entries: Vec<PatchEntry>,
    pub tables_created: Vec<String>,
}

impl PatchReport {
    fn record(&mut self, table: &str, column: &str, outcome: ColumnOutcome) {
        self.entries.push(PatchEntry {
            table: table.to_string(),
            column: column.to_string(),
            outcome,
        });
    }

    pub fn added(&self) -> usize {
        self.count(|outcome| matches!(outcome, ColumnOutcome::Added))
    }

    pub fn already_present(&self) -> usize {
        self.count(|outcome| matches!(outcome, ColumnOutcome::AlreadyPresent))
    }

    pub fn failures(&self) -> usize {
        self.count(|outcome| matches!(outcome, ColumnOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    /// True when the run changed nothing
    pub fn is_noop(&self) -> bool {
        self.tables_created.is_empty() && self.added() == 0
    }

    fn count(&self, predicate: impl Fn(&ColumnOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }

    /// Entries as a result for the reporter
    pub fn to_result_set(&self) -> Result<ResultSet> {
        let mut result = ResultSet::new(vec![
            Column::new("table", "TEXT"),
            Column::new("column", "TEXT"),
            Column::new("outcome", "TEXT"),
        ]);
        for entry in &self.entries {
            result.push_row(vec![
                Value::Text(entry.table.clone()),
                Value::Text(entry.column.clone()),
                Value::Text(entry.outcome.to_string()),
            ])?;
        }
        Ok(result)
    }

    /// Turn a report with failures into an error, after it has been shown
    pub fn into_result(self) -> Result<Self> {
        match self.failures() {
            0 => Ok(self),
            failed => Err(OpsError::Patch { failed }),
        }
    }
}

/// Schema patcher service
pub struct SchemaPatcher;

impl SchemaPatcher {
    /// Apply every table patch in `plan`.
    ///
    /// Column failures are recorded and the run continues; only a lost
    /// connection aborts it.
    pub async fn apply(pool: &sqlx::PgPool, plan: &PatchPlan) -> Result<PatchReport> {
        plan.validate()?;
        let mut report = PatchReport::default();
        for table in &plan.tables {
            Self::apply_table(pool, table, &mut report).await?;
        }
        info!(
            added = report.added(),
            already_present = report.already_present(),
            failed = report.failures(),
            "Schema patch finished"
        );
        Ok(report)
    }

    async fn apply_table(pool: &sqlx::PgPool, patch: &TablePatch, report: &mut PatchReport) -> Result<()> {
        let schema = normalize_identifier(&patch.schema)?;
        let table = normalize_identifier(&patch.table)?;
        let qualified = patch.display_name()?;

        if !CatalogService::table_exists(pool, &schema, &table).await? {
            if !patch.create_if_missing {
                for column in &patch.columns {
                    report.record(
                        &qualified,
                        &column.column_name()?,
                        ColumnOutcome::Failed(format!("table {} does not exist", qualified)),
                    );
                }
                warn!(table = %qualified, "Table missing, columns skipped");
                return Ok(());
            }

            let outcome = match StatementRunner::run(pool, &Statement::new(patch.create_table_sql()?)).await {
                Ok(_) => {
                    info!(table = %qualified, "Created table");
                    report.tables_created.push(qualified.clone());
                    ColumnOutcome::Added
                }
                Err(e @ OpsError::Connection(_)) => return Err(e),
                Err(e) => {
                    warn!(table = %qualified, error = %e, "Create table failed");
                    ColumnOutcome::Failed(e.to_string())
                }
            };
            for column in &patch.columns {
                report.record(&qualified, &column.column_name()?, outcome.clone());
            }
            return Ok(());
        }

        for column in &patch.columns {
            let name = column.column_name()?;
            let outcome = match CatalogService::column_exists(pool, &schema, &table, &name).await {
                Ok(true) => ColumnOutcome::AlreadyPresent,
                Ok(false) => {
                    let ddl = Statement::new(patch.add_column_sql(column)?);
                    match StatementRunner::run(pool, &ddl).await {
                        Ok(_) => ColumnOutcome::Added,
                        Err(e @ OpsError::Connection(_)) => return Err(e),
                        Err(e) => ColumnOutcome::Failed(e.to_string()),
                    }
                }
                Err(e @ OpsError::Connection(_)) => return Err(e),
                Err(e) => ColumnOutcome::Failed(e.to_string()),
            };
            match &outcome {
                ColumnOutcome::Failed(error) => warn!(table = %qualified, column = %name, %error, "Column change failed"),
                other => info!(table = %qualified, column = %name, outcome = %other, "Column checked"),
            }
            report.record(&qualified, &name, outcome);
        }
        Ok(())
    }
}

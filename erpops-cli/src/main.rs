use clap::Parser;
use erpops_core::{ConnectionError, LogContext, OpsError, QueryError, Result, init_cli_logging};
use erpops_db::{
    ColumnSpec, DatabaseConfig, DatabaseManager, Param, PatchPlan, PatchReport, ReportFormat,
    Statement, TablePatch, columns_result, normalize_identifier, render_outcome, render_result_set,
    tables_result,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Instrument, debug, warn};

mod config;
use config::Config;

#[cfg(test)]
mod cli_tests;

#[derive(Parser)]
#[command(name = "erpops")]
#[command(about = "Schema patcher and ad-hoc query runner for the college ERP database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (table, json, lines)
    #[arg(short, long, global = true)]
    format: Option<ReportFormat>,
}

#[derive(Parser)]
enum Commands {
    /// Check the connection and print the server version
    Ping,

    /// Run a single SQL statement and print its result
    Query {
        /// SQL text; use $1, $2, ... for parameters
        sql: String,

        /// Parameter as kind:value (int:42, bool:true, json:{..}, text:abc) or null
        #[arg(short, long = "param")]
        params: Vec<Param>,
    },

    /// Run an SQL script file
    RunFile {
        /// Path to the script
        path: PathBuf,
    },

    /// List the tables in a schema
    Tables {
        #[arg(long)]
        schema: Option<String>,
    },

    /// Describe the columns of a table
    Describe {
        table: String,

        #[arg(long)]
        schema: Option<String>,
    },

    /// Apply idempotent schema changes
    Patch {
        #[command(subcommand)]
        action: PatchActions,
    },
}

#[derive(Parser)]
enum PatchActions {
    /// Add a column unless it already exists
    AddColumn {
        /// Target table
        #[arg(long)]
        table: String,

        /// Column as NAME:TYPE, e.g. route_pdf:text
        #[arg(long)]
        column: String,

        /// Declare the column NOT NULL
        #[arg(long)]
        not_null: bool,

        /// Default expression
        #[arg(long)]
        default: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        /// Create the table when it does not exist
        #[arg(long)]
        create_if_missing: bool,
    },

    /// Apply a TOML patch plan
    Apply {
        /// Path to the plan file
        plan: PathBuf,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ping => "ping",
            Commands::Query { .. } => "query",
            Commands::RunFile { .. } => "run-file",
            Commands::Tables { .. } => "tables",
            Commands::Describe { .. } => "describe",
            Commands::Patch {
                action: PatchActions::AddColumn { .. },
            } => "patch add-column",
            Commands::Patch {
                action: PatchActions::Apply { .. },
            } => "patch apply",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let OpsError::Query(QueryError::Database { detail, hint, .. }) = &e {
                if let Some(detail) = detail {
                    eprintln!("Detail: {}", detail);
                }
                if let Some(hint) = hint {
                    eprintln!("Hint: {}", hint);
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // A missing .env is fine; anything else about it is worth a warning.
    let dotenv = dotenvy::dotenv();

    let config = Config::load(cli.config.as_deref())?;
    init_cli_logging(cli.verbose, config.logging.format)?;

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Ignoring unreadable .env file: {}", e);
        }
    }

    let format = cli.format.unwrap_or(config.output.format);
    let context = LogContext::new(cli.command.name(), "erpops-cli");

    let db_config = DatabaseConfig::from_env(config.database.clone())?;
    let manager = DatabaseManager::connect(&db_config).await?;

    let result = execute(&manager, cli.command, format, &config)
        .instrument(context.span())
        .await;
    manager.close().await;

    match &result {
        Ok(()) => context.debug("Command finished"),
        Err(e) => context.debug(&format!("Command failed: {}", e)),
    }
    result
}

async fn execute(manager: &DatabaseManager, command: Commands, format: ReportFormat, config: &Config) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Ping => {
            if !manager.health_check().await? {
                return Err(ConnectionError::Rejected {
                    reason: "health check failed".to_string(),
                }
                .into());
            }
            let version = manager.server_version().await?;
            writeln!(out, "ok: {}", manager.config().target())?;
            writeln!(out, "{}", version)?;
        }
        Commands::Query { sql, params } => {
            let statement = Statement::new(sql).with_params(params);
            let outcome = manager.run_statement(&statement).await?;
            render_outcome(&outcome, format, &mut out)?;
        }
        Commands::RunFile { path } => {
            let sql = std::fs::read_to_string(&path)?;
            debug!(path = %path.display(), bytes = sql.len(), "Running script");
            let affected = manager.execute_script(&sql).await?;
            writeln!(out, "{} row(s) affected", affected)?;
        }
        Commands::Tables { schema } => {
            let schema = schema_name(schema, config)?;
            let tables = manager.list_tables(&schema).await?;
            render_result_set(&tables_result(&tables)?, format, &mut out)?;
        }
        Commands::Describe { table, schema } => {
            let schema = schema_name(schema, config)?;
            let table = normalize_identifier(&table)?;
            match manager.describe_table(&schema, &table).await {
                Ok(columns) => render_result_set(&columns_result(&columns)?, format, &mut out)?,
                Err(OpsError::NotFound(missing)) => {
                    writeln!(out, "(no such table: {})", missing.key)?;
                }
                Err(e) => return Err(e),
            }
        }
        Commands::Patch { action } => {
            let plan = match action {
                PatchActions::AddColumn {
                    table,
                    column,
                    not_null,
                    default,
                    schema,
                    create_if_missing,
                } => {
                    let mut column = ColumnSpec::parse(&column)?;
                    if not_null {
                        column = column.not_null();
                    }
                    if let Some(default) = default {
                        column = column.with_default(default);
                    }
                    let mut patch = TablePatch::new(table)
                        .in_schema(schema.unwrap_or_else(|| config.output.schema.clone()))
                        .column(column);
                    if create_if_missing {
                        patch = patch.create_if_missing();
                    }
                    PatchPlan::single(patch)
                }
                PatchActions::Apply { plan } => PatchPlan::from_file(&plan)?,
            };
            let report = manager.apply_patch(&plan).await?;
            print_patch_report(&report, format, &mut out)?;
            report.into_result()?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Schema to inspect, folded the way the patcher folds it
fn schema_name(schema: Option<String>, config: &Config) -> Result<String> {
    normalize_identifier(schema.as_deref().unwrap_or(&config.output.schema))
}

fn print_patch_report<W: Write>(report: &PatchReport, format: ReportFormat, out: &mut W) -> Result<()> {
    if format == ReportFormat::Json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    render_result_set(&report.to_result_set()?, format, out)?;
    if format == ReportFormat::Table {
        for table in &report.tables_created {
            writeln!(out, "created table {}", table)?;
        }
        writeln!(
            out,
            "{} added, {} already present, {} failed",
            report.added(),
            report.already_present(),
            report.failures()
        )?;
    }
    Ok(())
}

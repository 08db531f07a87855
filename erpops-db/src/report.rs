//! Human-facing rendering of statement results

use crate::database::{runner::StatementOutcome, value::ResultSet};
use comfy_table::{Table, presets::UTF8_FULL};
use erpops_core::{OpsError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Output mode for result sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Boxed table with a row-count footer
    #[default]
    Table,
    /// Pretty-printed array of objects
    Json,
    /// One row per line, values joined by ` | `
    Lines,
}

impl std::str::FromStr for ReportFormat {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(ReportFormat::Table),
            "json" => Ok(ReportFormat::Json),
            "lines" => Ok(ReportFormat::Lines),
            other => Err(OpsError::validation(format!(
                "Unknown output format '{}': expected table, json or lines",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReportFormat::Table => "table",
            ReportFormat::Json => "json",
            ReportFormat::Lines => "lines",
        };
        write!(f, "{}", name)
    }
}

/// Write `result` to `out` in the requested format
pub fn render_result_set<W: Write>(result: &ResultSet, format: ReportFormat, out: &mut W) -> Result<()> {
    match format {
        ReportFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(result.columns().iter().map(|column| column.name.as_str()));
            for row in result.rows() {
                table.add_row(row.values().iter().map(ToString::to_string));
            }
            writeln!(out, "{}", table)?;
            let noun = if result.len() == 1 { "row" } else { "rows" };
            writeln!(out, "({} {})", result.len(), noun)?;
        }
        ReportFormat::Json => {
            let records: Vec<_> = result.records().collect();
            serde_json::to_writer_pretty(&mut *out, &records)?;
            writeln!(out)?;
        }
        ReportFormat::Lines => {
            for row in result.rows() {
                let line = row
                    .values()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" | ");
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}

/// Write a statement outcome; affected-row counts become a single line
pub fn render_outcome<W: Write>(outcome: &StatementOutcome, format: ReportFormat, out: &mut W) -> Result<()> {
    match outcome {
        StatementOutcome::Rows(result) => render_result_set(result, format, out),
        StatementOutcome::Affected(count) => {
            match format {
                ReportFormat::Json => writeln!(out, "{{\"rows_affected\": {}}}", count)?,
                _ => writeln!(out, "{} row(s) affected", count)?,
            }
            Ok(())
        }
    }
}

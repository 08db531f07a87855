//! erpops database library
//!
//! Connection handling, single-statement execution, catalog inspection,
//! idempotent schema patching and result reporting for the college ERP
//! PostgreSQL database.

pub mod database;
pub mod report;

pub use database::*;
pub use report::{render_outcome, render_result_set, ReportFormat};

//! Database access for erpops
//!
//! One connection provider per process, passed explicitly to the runner,
//! catalog and patcher services.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod patch;
pub mod runner;
pub mod statement;
pub mod value;

pub use catalog::{CatalogService, ColumnInfo, columns_result, tables_result};
pub use config::{DatabaseConfig, PoolSettings};
pub use connection::DatabaseConnection;
pub use manager::DatabaseManager;
pub use patch::{
    ColumnOutcome, ColumnSpec, PatchEntry, PatchPlan, PatchReport, SchemaPatcher, TablePatch,
    normalize_identifier,
};
pub use runner::{StatementOutcome, StatementRunner};
pub use statement::{Param, Statement};
pub use value::{Column, ResultSet, Row, Value};

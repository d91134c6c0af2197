//! Single-session PostgreSQL connection wrapper.
//!
//! This crate provides:
//!
//! - **error**: Structured error taxonomy
//! - **models**: Configuration, connection state, values, rows and requests
//! - **services**: Config resolution, driver, connection lifecycle, query execution
//! - **database**: The `Database` facade used by application code
//! - **logging**: Structured logging setup

pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

#[cfg(test)]
mod testing;

pub use database::{Database, DatabaseOptions};
pub use error::{DbError, ErrorInfo, ErrorKind};
pub use models::{
    ConfigField, ConfigValues, ConnectionConfig, ConnectionState, FetchCardinality, PortValue,
    QueryMode, QueryRequest, QueryType, Row, SqlValue,
};
pub use services::{
    ConfigStore, ConnectionManager, Driver, EnvNames, PostgresDriver, PostgresOptions,
    QueryExecutor, QueryResult, Session,
};

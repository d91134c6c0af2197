//! The driver capability the connection manager is built on.
//!
//! A [`Driver`] opens [`Session`]s; a session runs statements and manages
//! transactions. [`PostgresDriver`](crate::services::PostgresDriver) is the
//! production implementation.

use crate::error::DbError;
use crate::models::{ConnectionConfig, FetchCardinality, Row, SqlValue};

/// Opens sessions for a validated configuration.
pub trait Driver: Send {
    /// Open and authenticate a new session.
    ///
    /// Errors are [`DbError::Connection`] or [`DbError::Authentication`].
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>, DbError>;

    /// Driver name for logs.
    fn name(&self) -> &'static str;
}

/// A live, single-threaded database session.
///
/// SQL passed here already uses `$N` placeholders and `params` matches them.
pub trait Session: Send {
    /// Start a transaction.
    fn begin(&mut self) -> Result<(), DbError>;

    /// Run a statement, returning rows affected.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Run a statement and retrieve one or all of its rows.
    fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        cardinality: FetchCardinality,
    ) -> Result<Vec<Row>, DbError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), DbError>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Check if the server side of the session has gone away.
    fn is_closed(&self) -> bool;

    /// Release the session.
    fn close(self: Box<Self>) -> Result<(), DbError>;
}

//! Statement execution against a connected manager.
//!
//! Every statement runs in its own transaction: committed on success,
//! rolled back on failure. A failed statement leaves the session usable
//! unless the driver reports the connection itself as gone.

use crate::error::DbError;
use crate::models::{BoundStatement, FetchCardinality, QueryMode, QueryRequest, QueryType, Row, SqlValue};
use crate::services::connection::ConnectionManager;
use crate::services::driver::Session;

use std::time::Instant;

/// Results from query execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Rows retrieved; empty for execute-only statements
    pub rows: Vec<Row>,
    /// Rows affected (execute-only statements)
    pub rows_affected: Option<u64>,
    /// Time to execute in milliseconds
    pub execution_time_ms: u64,
    /// Type of query
    pub query_type: QueryType,
}

impl QueryResult {
    /// Get the number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs statements through a [`ConnectionManager`].
pub struct QueryExecutor;

impl QueryExecutor {
    /// Execute a statement that returns no rows. Returns rows affected.
    pub fn run_query(
        manager: &mut ConnectionManager,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<u64, DbError> {
        let request = QueryRequest::execute(statement, params.to_vec());
        let result = Self::submit(manager, request)?;
        Ok(result.rows_affected.unwrap_or_default())
    }

    /// Execute a statement and fetch the next row or all rows.
    ///
    /// Zero matching rows is an empty vector, not an error.
    pub fn run_read_query(
        manager: &mut ConnectionManager,
        statement: &str,
        params: &[SqlValue],
        fetch_all: bool,
    ) -> Result<Vec<Row>, DbError> {
        let request = QueryRequest::fetch(
            statement,
            params.to_vec(),
            FetchCardinality::from_fetch_all(fetch_all),
        );
        Ok(Self::submit(manager, request)?.rows)
    }

    /// Bind and run a request in its own transaction.
    pub fn submit(
        manager: &mut ConnectionManager,
        request: QueryRequest,
    ) -> Result<QueryResult, DbError> {
        let bound = request.bind().inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected statement before submission");
        })?;

        let start = Instant::now();
        tracing::debug!(
            query_type = ?bound.query_type,
            mode = ?bound.mode,
            params = bound.params.len(),
            sql = %truncate_sql(&bound.sql, 200),
            "Executing query"
        );

        let session = manager.session()?;
        let outcome = Self::run_in_transaction(session, &bound);

        let (rows, rows_affected) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                if session.is_closed() || e.is_connection_lost() {
                    manager.mark_lost();
                    return Err(into_connection_error(e));
                }
                tracing::warn!(
                    error = %e,
                    code = e.pg_code().unwrap_or_default(),
                    sql = %truncate_sql(&bound.sql, 200),
                    "Query failed, transaction rolled back"
                );
                return Err(e);
            }
        };

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            execution_time_ms,
            row_count = rows.len(),
            rows_affected = rows_affected.unwrap_or_default(),
            "Query completed"
        );

        Ok(QueryResult { rows, rows_affected, execution_time_ms, query_type: bound.query_type })
    }

    /// Detect the type of SQL query.
    pub fn detect_query_type(sql: &str) -> QueryType {
        QueryType::detect(sql)
    }

    fn run_in_transaction(
        session: &mut dyn Session,
        bound: &BoundStatement,
    ) -> Result<(Vec<Row>, Option<u64>), DbError> {
        session.begin()?;

        let result = match bound.mode {
            QueryMode::Execute => {
                session.execute(&bound.sql, &bound.params).map(|n| (Vec::new(), Some(n)))
            }
            QueryMode::Fetch(cardinality) => {
                session.fetch(&bound.sql, &bound.params, cardinality).map(|rows| (rows, None))
            }
        };

        match result {
            Ok(outcome) => {
                session.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                if !session.is_closed() {
                    if let Err(rollback_err) = session.rollback() {
                        tracing::warn!(error = %rollback_err, "Rollback failed");
                    }
                }
                Err(e)
            }
        }
    }
}

/// Report a failure that ended the session as a connection error, keeping
/// the driver's message.
fn into_connection_error(err: DbError) -> DbError {
    if err.is_connection_lost() {
        err
    } else {
        DbError::connection_with_source(err.to_string(), err)
    }
}

/// Truncate SQL for logging.
fn truncate_sql(sql: &str, max_len: usize) -> String {
    match sql.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

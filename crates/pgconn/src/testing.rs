//! Scripted in-memory driver for unit tests.
//!
//! Records every call it receives so tests can assert what reached the
//! driver, and answers statements from responses registered up front.

use crate::error::DbError;
use crate::models::{ConfigValues, ConnectionConfig, FetchCardinality, Row, SqlValue};
use crate::services::{ConfigStore, Driver, Session};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A call that reached a fake session.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Begin,
    Execute(String, Vec<SqlValue>),
    Fetch(String, Vec<SqlValue>, FetchCardinality),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct FakeState {
    opened: usize,
    closed: usize,
    refuse: Option<String>,
    calls: Vec<DriverCall>,
    rows: HashMap<String, Vec<Row>>,
    failures: HashMap<String, (String, String)>,
    lose_connection_on: Option<String>,
    terminate_on: Option<(String, String, String)>,
    lost: bool,
}

/// Driver whose sessions share one script and call log.
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `open` fail with `message`.
    pub fn refuse_connections(&self, message: &str) {
        self.state.lock().refuse = Some(message.to_string());
    }

    /// Accept connections again.
    pub fn accept_connections(&self) {
        self.state.lock().refuse = None;
    }

    /// Rows returned when `sql` is fetched.
    pub fn respond(&self, sql: &str, rows: Vec<Row>) {
        self.state.lock().rows.insert(sql.to_string(), rows);
    }

    /// Make `sql` fail with a server error.
    pub fn fail(&self, sql: &str, code: &str, message: &str) {
        self.state
            .lock()
            .failures
            .insert(sql.to_string(), (code.to_string(), message.to_string()));
    }

    /// Drop the connection when `sql` runs.
    pub fn lose_connection_on(&self, sql: &str) {
        self.state.lock().lose_connection_on = Some(sql.to_string());
    }

    /// Fail `sql` with a server error that also ends the session.
    pub fn terminate_on(&self, sql: &str, code: &str, message: &str) {
        self.state.lock().terminate_on =
            Some((sql.to_string(), code.to_string(), message.to_string()));
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl Driver for FakeDriver {
    fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn Session>, DbError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.refuse {
            return Err(DbError::connection(message.clone()));
        }
        state.opened += 1;
        state.lost = false;
        Ok(Box::new(FakeSession { state: self.state.clone() }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn run(&mut self, sql: &str, call: DriverCall) -> Result<(), DbError> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(DbError::connection("Connection closed"));
        }
        state.calls.push(call);

        if state.lose_connection_on.as_deref() == Some(sql) {
            state.lost = true;
            return Err(DbError::connection("server closed the connection unexpectedly"));
        }
        if let Some((_, code, message)) = state.terminate_on.clone().filter(|(on, _, _)| on == sql) {
            state.lost = true;
            return Err(DbError::Execution {
                message,
                detail: None,
                hint: None,
                position: None,
                code: Some(code),
            });
        }
        if let Some((code, message)) = state.failures.get(sql) {
            return Err(DbError::Execution {
                message: message.clone(),
                detail: None,
                hint: None,
                position: None,
                code: Some(code.clone()),
            });
        }
        Ok(())
    }
}

impl Session for FakeSession {
    fn begin(&mut self) -> Result<(), DbError> {
        self.run("BEGIN", DriverCall::Begin)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.run(sql, DriverCall::Execute(sql.to_string(), params.to_vec()))?;
        Ok(1)
    }

    fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        cardinality: FetchCardinality,
    ) -> Result<Vec<Row>, DbError> {
        self.run(sql, DriverCall::Fetch(sql.to_string(), params.to_vec(), cardinality))?;
        let mut rows = self.state.lock().rows.get(sql).cloned().unwrap_or_default();
        if cardinality == FetchCardinality::One {
            rows.truncate(1);
        }
        Ok(rows)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.run("COMMIT", DriverCall::Commit)
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.run("ROLLBACK", DriverCall::Rollback)
    }

    fn is_closed(&self) -> bool {
        self.state.lock().lost
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

/// A complete configuration for database `db`.
pub fn sample_config() -> ConnectionConfig {
    let mut store = ConfigStore::new();
    store.apply_overrides(
        ConfigValues::new().name("db").host("127.0.0.1").port("5432").user("u").password("p"),
    );
    store.validate().expect("sample config is complete")
}

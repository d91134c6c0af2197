//! The application-facing connection object.
//!
//! [`Database`] ties the config store, the connection manager and the query
//! executor together:
//!
//! ```no_run
//! use pgconn::{ConfigValues, Database, DatabaseOptions};
//!
//! let mut db = Database::with_options(DatabaseOptions::manual())?;
//! db.update_config_values(
//!     ConfigValues::new().name("db").host("127.0.0.1").port("5432").user("u").password("p"),
//! );
//! db.connect()?;
//! let rows = db.run_read_query("SELECT * FROM t WHERE val = %s", &[2.into()], true)?;
//! println!("{} row(s)", rows.len());
//! db.close()?;
//! # Ok::<(), pgconn::DbError>(())
//! ```

use crate::error::DbError;
use crate::models::{ConfigValues, ConnectionConfig, ConnectionState, QueryRequest, Row, SqlValue};
use crate::services::config::{ConfigStore, EnvNames, DEFAULT_CONFIG_FILE};
use crate::services::connection::ConnectionManager;
use crate::services::driver::Driver;
use crate::services::postgres::PostgresDriver;
use crate::services::query::{QueryExecutor, QueryResult};

use std::path::{Path, PathBuf};

/// How a [`Database`] is set up on construction.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Resolve environment and config file on construction
    pub auto_config: bool,
    /// Connect right after auto-config
    pub auto_connect: bool,
    /// Config file to read; an explicit path must exist
    pub config_file: Option<PathBuf>,
    /// Environment variable names to read
    pub env_names: EnvNames,
}

impl DatabaseOptions {
    /// Auto-config from the environment and `conn.json`, if present.
    pub fn auto() -> Self {
        Self::default()
    }

    /// No automatic resolution; the caller supplies every value.
    pub fn manual() -> Self {
        Self { auto_config: false, ..Self::default() }
    }

    /// Read a specific config file, which must exist.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Connect as part of construction.
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Read custom environment variable names.
    pub fn with_env_names(mut self, env_names: EnvNames) -> Self {
        self.env_names = env_names;
        self
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self { auto_config: true, auto_connect: false, config_file: None, env_names: EnvNames::default() }
    }
}

/// A single PostgreSQL session with layered configuration.
#[derive(Debug)]
pub struct Database {
    store: ConfigStore,
    manager: ConnectionManager,
}

impl Database {
    /// Create with auto-config and the PostgreSQL driver.
    pub fn new() -> Result<Self, DbError> {
        Self::with_options(DatabaseOptions::auto())
    }

    /// Create with custom options and the PostgreSQL driver.
    pub fn with_options(options: DatabaseOptions) -> Result<Self, DbError> {
        Self::with_driver(options, PostgresDriver::new())
    }

    /// Create with custom options and driver.
    pub fn with_driver(options: DatabaseOptions, driver: impl Driver + 'static) -> Result<Self, DbError> {
        let mut db = Self {
            store: ConfigStore::with_env_names(options.env_names.clone()),
            manager: ConnectionManager::with_driver(driver),
        };

        if options.auto_config {
            db.store.resolve_from_environment();
            match &options.config_file {
                Some(path) => {
                    db.store.resolve_from_file(path)?;
                }
                None => {
                    db.store.resolve_from_file_optional(DEFAULT_CONFIG_FILE)?;
                }
            }

            if options.auto_connect {
                db.connect()?;
            }
        }

        Ok(db)
    }

    // ========== Configuration ==========

    /// Override any subset of name, host, port, user and password.
    pub fn update_config_values(&mut self, values: ConfigValues) {
        self.store.apply_overrides(values);
    }

    /// Load the file layer from `path`, which must exist.
    pub fn update_config_values_from_json(&mut self, path: impl AsRef<Path>) -> Result<(), DbError> {
        self.store.resolve_from_file(path).map(|_| ())
    }

    /// Reload the environment layer.
    pub fn update_config_values_from_env(&mut self) {
        self.store.resolve_from_environment();
    }

    /// The config store, for inspection.
    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    /// Configuration the current session was opened with.
    pub fn active_config(&self) -> Option<&ConnectionConfig> {
        self.manager.config().filter(|_| self.manager.is_connected())
    }

    // ========== Connection ==========

    /// Validate the configuration and open a session.
    pub fn connect(&mut self) -> Result<(), DbError> {
        let config = self.store.validate()?;
        self.manager.connect(config)
    }

    /// Close the session. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), DbError> {
        self.manager.close()
    }

    /// Check if a session is open.
    pub fn connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    // ========== Queries ==========

    /// Execute a statement that returns no rows. Returns rows affected.
    pub fn run_query(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        QueryExecutor::run_query(&mut self.manager, statement, params)
    }

    /// Execute a statement and fetch the next row or all rows.
    pub fn run_read_query(
        &mut self,
        statement: &str,
        params: &[SqlValue],
        fetch_all: bool,
    ) -> Result<Vec<Row>, DbError> {
        QueryExecutor::run_read_query(&mut self.manager, statement, params, fetch_all)
    }

    /// Submit a prepared request.
    pub fn submit(&mut self, request: QueryRequest) -> Result<QueryResult, DbError> {
        QueryExecutor::submit(&mut self.manager, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::ConfigField;
    use crate::testing::FakeDriver;
    use std::io::Write;

    fn manual(driver: &FakeDriver) -> Database {
        Database::with_driver(DatabaseOptions::manual(), driver.clone()).unwrap()
    }

    #[test]
    fn test_manual_mode_connect_and_close() {
        let driver = FakeDriver::new();
        let mut db = manual(&driver);

        db.update_config_values(
            ConfigValues::new().name("db").host("127.0.0.1").port("5432").user("u").password("p"),
        );
        db.connect().unwrap();
        assert!(db.connected());
        assert_eq!(db.active_config().map(ConnectionConfig::port), Some(5432));

        db.close().unwrap();
        assert!(!db.connected());
        assert_eq!(db.state(), ConnectionState::Closed);
        assert!(db.active_config().is_none());
    }

    #[test]
    fn test_connect_with_incomplete_config_never_opens() {
        let driver = FakeDriver::new();
        let mut db = manual(&driver);
        db.update_config_values(ConfigValues::new().name("db"));

        match db.connect() {
            Err(DbError::ConfigIncomplete { missing }) => {
                assert_eq!(missing, vec![ConfigField::User, ConfigField::Password]);
            }
            other => panic!("expected ConfigIncomplete, got {other:?}"),
        }
        assert_eq!(driver.opened(), 0);
        assert_eq!(db.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let options = DatabaseOptions::auto().with_config_file(dir.path().join("conn.json"));

        let err = Database::with_driver(options, FakeDriver::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_auto_config_and_auto_connect_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"db_name":"db","db_host":"h","db_port":5432,"db_user":"u","db_pass":"p"}"#)
            .unwrap();
        let driver = FakeDriver::new();
        let options = DatabaseOptions::auto()
            .with_config_file(file.path())
            .with_env_names(EnvNames::with_prefix("PGCONN_UNSET_TEST_"))
            .with_auto_connect(true);

        let db = Database::with_driver(options, driver.clone()).unwrap();
        assert!(db.connected());
        assert_eq!(db.active_config().map(ConnectionConfig::host), Some("h"));
        assert_eq!(driver.opened(), 1);
    }

    #[test]
    fn test_auto_connect_failure_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"name":"db","user":"u","password":"p"}"#).unwrap();
        let driver = FakeDriver::new();
        driver.refuse_connections("connection refused");
        let options = DatabaseOptions::auto()
            .with_config_file(file.path())
            .with_env_names(EnvNames::with_prefix("PGCONN_UNSET_TEST_"))
            .with_auto_connect(true);

        let err = Database::with_driver(options, driver).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_manual_mode_ignores_auto_connect() {
        let driver = FakeDriver::new();
        let options = DatabaseOptions::manual().with_auto_connect(true);

        let db = Database::with_driver(options, driver.clone()).unwrap();
        assert!(!db.connected());
        assert_eq!(driver.opened(), 0);
    }

    #[test]
    fn test_queries_delegate_to_executor() {
        let driver = FakeDriver::new();
        driver.respond("SELECT name FROM t", vec![Row::new().with("name", "a")]);
        let mut db = manual(&driver);
        db.update_config_values(ConfigValues::new().name("db").user("u").password("p"));
        db.connect().unwrap();

        assert_eq!(db.run_query("UPDATE t SET name = %s", &["b".into()]).unwrap(), 1);
        let rows = db.run_read_query("SELECT name FROM t", &[], false).unwrap();
        assert_eq!(rows[0].get("name"), Some(&SqlValue::Text("a".to_string())));
    }
}

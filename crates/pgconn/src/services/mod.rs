//! Services for pgconn.
//!
//! - `config` - Layered resolution of connection parameters
//! - `driver` - Driver and session capability traits
//! - `postgres` - tokio-postgres implementation of the driver
//! - `connection` - Single-session lifecycle management
//! - `query` - Statement execution with per-statement transactions

pub mod config;
pub mod connection;
pub mod driver;
pub mod postgres;
pub mod query;

pub use config::{ConfigStore, EnvNames, DEFAULT_CONFIG_FILE};
pub use connection::ConnectionManager;
pub use driver::{Driver, Session};
pub use postgres::{PostgresDriver, PostgresOptions, PostgresSession};
pub use query::{QueryExecutor, QueryResult};

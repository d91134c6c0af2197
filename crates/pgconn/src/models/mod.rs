//! Data models for pgconn.
//!
//! - `config` - ConfigValues, ConnectionConfig, PortValue
//! - `connection` - ConnectionState
//! - `query` - QueryRequest, placeholder parsing, QueryType
//! - `value` - SqlValue, Row

pub mod config;
pub mod connection;
pub mod query;
pub mod value;

pub use config::{ConfigField, ConfigValues, ConnectionConfig, PortValue, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::ConnectionState;
pub use query::{
    BoundStatement, FetchCardinality, ParsedStatement, PlaceholderStyle, QueryMode, QueryRequest,
    QueryType,
};
pub use value::{Row, SqlValue};

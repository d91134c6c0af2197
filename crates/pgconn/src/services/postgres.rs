//! PostgreSQL driver backed by tokio-postgres.
//!
//! Each session owns a current-thread tokio runtime. The connection task is
//! spawned onto it and only makes progress while a call blocks on the
//! runtime, which is exactly when the client needs it.

use crate::error::DbError;
use crate::models::{ConnectionConfig, FetchCardinality, Row, SqlValue};
use crate::services::driver::{Driver, Session};

use bytes::BytesMut;
use futures_util::StreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::error::Error;
use std::pin::pin;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

/// Session settings that are not part of the connection parameters.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Application name sent to PostgreSQL
    pub application_name: String,
    /// Connect timeout; `None` waits for the OS
    pub connect_timeout: Option<Duration>,
    /// TCP keepalive idle time; `None` disables keepalives
    pub keepalive_idle: Option<Duration>,
    /// `client_connection_check_interval` set after connecting, on
    /// PostgreSQL 14 and later; `None` keeps the server default
    pub connection_check_interval: Option<Duration>,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            application_name: "pgconn".to_string(),
            connect_timeout: None,
            keepalive_idle: Some(Duration::from_secs(60)),
            connection_check_interval: Some(Duration::from_secs(2)),
        }
    }
}

/// Opens plain-TCP sessions with tokio-postgres.
#[derive(Debug, Clone, Default)]
pub struct PostgresDriver {
    options: PostgresOptions,
}

impl PostgresDriver {
    /// Create a driver with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with custom options.
    pub fn with_options(options: PostgresOptions) -> Self {
        Self { options }
    }

    /// Build the tokio-postgres config for `config`.
    fn pg_config(&self, config: &ConnectionConfig) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(config.host());
        pg_config.port(config.port());
        pg_config.dbname(config.name());
        pg_config.user(config.user());
        pg_config.password(config.password());
        pg_config.application_name(&self.options.application_name);
        if let Some(timeout) = self.options.connect_timeout {
            pg_config.connect_timeout(timeout);
        }
        match self.options.keepalive_idle {
            Some(idle) => {
                pg_config.keepalives(true);
                pg_config.keepalives_idle(idle);
            }
            None => {
                pg_config.keepalives(false);
            }
        }
        pg_config
    }
}

impl Driver for PostgresDriver {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>, DbError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to create tokio runtime: {e}")))?;

        let pg_config = self.pg_config(config);
        let (client, connection) =
            runtime.block_on(pg_config.connect(NoTls)).map_err(DbError::from_connect_error)?;

        let database = config.name().to_string();
        let connection_task = runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(database = %database, error = %e, "PostgreSQL connection terminated");
            }
        });

        if let Some(interval) = self.options.connection_check_interval {
            if let Err(e) = configure_session(&runtime, &client, interval) {
                tracing::warn!(error = %e, "Could not set client_connection_check_interval");
            }
        }

        Ok(Box::new(PostgresSession { runtime, client, connection_task }))
    }

    fn name(&self) -> &'static str {
        "tokio-postgres"
    }
}

/// Apply session settings that need the server version.
fn configure_session(
    runtime: &Runtime,
    client: &Client,
    interval: Duration,
) -> Result<(), tokio_postgres::Error> {
    runtime.block_on(async {
        let messages = client.simple_query("SHOW server_version_num").await?;
        let version = messages
            .iter()
            .find_map(|message| match message {
                SimpleQueryMessage::Row(row) => row.get(0).and_then(|v| v.parse::<u32>().ok()),
                _ => None,
            })
            .unwrap_or_default();

        match connection_check_statement(version, interval) {
            Some(statement) => {
                tracing::debug!(server_version_num = version, %statement, "Configuring session");
                client.batch_execute(&statement).await
            }
            None => Ok(()),
        }
    })
}

/// The setting exists from PostgreSQL 14 (`server_version_num` 140000).
fn connection_check_statement(server_version_num: u32, interval: Duration) -> Option<String> {
    (server_version_num >= 140_000)
        .then(|| format!("SET client_connection_check_interval TO {}", interval.as_millis()))
}

/// A tokio-postgres client plus the runtime driving its connection.
pub struct PostgresSession {
    runtime: Runtime,
    client: Client,
    connection_task: JoinHandle<()>,
}

impl PostgresSession {
    fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.runtime.block_on(self.client.batch_execute(sql)).map_err(DbError::from)
    }
}

impl Session for PostgresSession {
    fn begin(&mut self) -> Result<(), DbError> {
        self.batch("BEGIN")
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        // Without parameters the simple protocol runs multi-statement scripts.
        if params.is_empty() {
            let messages =
                self.runtime.block_on(self.client.simple_query(sql)).map_err(DbError::from)?;
            return Ok(messages
                .iter()
                .filter_map(|message| match message {
                    SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                    _ => None,
                })
                .sum());
        }

        let params = as_params(params);
        self.runtime.block_on(self.client.execute(sql, &params)).map_err(DbError::from)
    }

    fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        cardinality: FetchCardinality,
    ) -> Result<Vec<Row>, DbError> {
        let client = &self.client;
        let pg_rows = match cardinality {
            FetchCardinality::All => {
                let params = as_params(params);
                self.runtime.block_on(client.query(sql, &params)).map_err(DbError::from)?
            }
            FetchCardinality::One => self
                .runtime
                .block_on(async {
                    let stream =
                        client.query_raw(sql, params.iter().map(|p| p as &dyn ToSql)).await?;
                    let mut stream = pin!(stream);
                    let first = stream.next().await.transpose()?;
                    Ok::<_, tokio_postgres::Error>(first.into_iter().collect::<Vec<_>>())
                })
                .map_err(DbError::from)?,
        };

        pg_rows.iter().map(decode_row).collect()
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.batch("ROLLBACK")
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        let PostgresSession { runtime, client, connection_task } = *self;

        // Dropping the client sends Terminate; the connection task then ends.
        drop(client);
        runtime
            .block_on(connection_task)
            .map_err(|e| DbError::internal(format!("Connection task failed: {e}")))
    }
}

fn as_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

// ========== Parameter encoding ==========

/// Binds each variant to the parameter type the server inferred, converting
/// where the conversion is lossless.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => v.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                _ if is_text(ty) => v.to_string().as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            SqlValue::Text(s) => match *ty {
                _ if is_text(ty) => s.as_str().to_sql(ty, out),
                Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
                Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
                Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
                Type::BOOL => parse_bool(s).ok_or_else(|| mismatch(self, ty))?.to_sql(ty, out),
                Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn mismatch(value: &SqlValue, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {} value to parameter of type {}", value.type_name(), ty.name()).into()
}

// ========== Row decoding ==========

/// Convert a PostgreSQL row into a name → value mapping.
fn decode_row(row: &tokio_postgres::Row) -> Result<Row, DbError> {
    let mut decoded = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        decoded.push(column.name(), decode_value(row, idx, column.type_())?);
    }
    Ok(decoded)
}

fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue, DbError> {
    match *ty {
        Type::BOOL => get(row, idx, SqlValue::Bool),
        Type::INT2 => get(row, idx, |v: i16| SqlValue::Int(v.into())),
        Type::INT4 => get(row, idx, |v: i32| SqlValue::Int(v.into())),
        Type::INT8 => get(row, idx, SqlValue::Int),
        Type::OID => get(row, idx, |v: u32| SqlValue::Int(v.into())),
        Type::FLOAT4 => get(row, idx, |v: f32| SqlValue::Float(v.into())),
        Type::FLOAT8 => get(row, idx, SqlValue::Float),
        Type::NUMERIC => get(row, idx, decimal_value),
        Type::UUID => get(row, idx, |v: uuid::Uuid| SqlValue::Text(v.to_string())),
        Type::JSON | Type::JSONB => {
            get(row, idx, |v: serde_json::Value| SqlValue::Text(v.to_string()))
        }
        Type::TIMESTAMPTZ => {
            get(row, idx, |v: chrono::DateTime<chrono::Utc>| SqlValue::Text(v.to_rfc3339()))
        }
        Type::TIMESTAMP => get(row, idx, |v: chrono::NaiveDateTime| SqlValue::Text(v.to_string())),
        Type::DATE => get(row, idx, |v: chrono::NaiveDate| SqlValue::Text(v.to_string())),
        Type::TIME => get(row, idx, |v: chrono::NaiveTime| SqlValue::Text(v.to_string())),
        _ if <String as FromSql>::accepts(ty) => get(row, idx, SqlValue::Text),
        _ => Err(DbError::execution(format!(
            "column \"{}\" has unsupported type {}; cast it to text in the query",
            row.columns()[idx].name(),
            ty.name()
        ))),
    }
}

/// Whole numbers that fit become `Int`; anything else keeps its exact
/// digits as `Text`.
fn decimal_value(value: Decimal) -> SqlValue {
    match value.to_i64() {
        Some(int) if value.fract().is_zero() => SqlValue::Int(int),
        _ => SqlValue::Text(value.to_string()),
    }
}

fn get<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, convert: F) -> Result<SqlValue, DbError>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    row.try_get::<_, Option<T>>(idx)
        .map(|value| value.map_or(SqlValue::Null, convert))
        .map_err(|e| DbError::execution(format!("Failed to decode column {idx}: {e}")))
}

//! Error types for pgconn.
//!
//! Every failure carries structured fields so callers can branch on
//! [`DbError::kind`] instead of matching message text.

use crate::models::{ConfigField, ConnectionState};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pgconn.
#[derive(Debug, Error)]
pub enum DbError {
    /// Required connection fields are still unset after resolution.
    #[error("Config incomplete: missing {}", ConfigField::join(missing))]
    ConfigIncomplete {
        /// Every missing field, in declaration order.
        missing: Vec<ConfigField>,
    },

    /// A configuration value or document could not be used.
    #[error("Invalid config: {message}")]
    InvalidConfig {
        /// Offending field, when the problem is tied to one.
        field: Option<ConfigField>,
        /// Human-readable error message.
        message: String,
    },

    /// A required configuration file does not exist.
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound {
        /// Absolute or caller-supplied path that was probed.
        path: PathBuf,
    },

    /// The driver rejected the connection attempt or the session was lost.
    #[error("Connection error: {message}")]
    Connection {
        /// Driver message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server rejected the credentials.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Driver message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// An operation needing a live session ran in the wrong state.
    #[error("Cannot {operation} while {state}")]
    IllegalState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the connection was in.
        state: ConnectionState,
    },

    /// Parameters do not fit the statement's placeholders.
    #[error("Binding error: {message}")]
    Binding {
        /// Number of placeholders found in the statement.
        expected: usize,
        /// Number of parameters supplied.
        actual: usize,
        /// Human-readable error message.
        message: String,
    },

    /// The server failed to execute a bound statement.
    #[error("{message}")]
    Execution {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// SQLSTATE code (e.g., "42P01").
        code: Option<String>,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

/// Coarse error classification for callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing fields after resolution.
    ConfigIncomplete,
    /// Unusable config value, document or path.
    Config,
    /// Connection attempt rejected or session lost.
    Connection,
    /// Operation invoked in the wrong connection state.
    IllegalState,
    /// Parameter/placeholder mismatch.
    Binding,
    /// Statement failed on the server.
    Execution,
    /// Bug or unexpected runtime failure.
    Internal,
}

impl DbError {
    // ========== Constructors ==========

    /// Create a config incomplete error.
    pub fn config_incomplete(missing: Vec<ConfigField>) -> Self {
        Self::ConfigIncomplete { missing }
    }

    /// Create an invalid config error tied to a field.
    pub fn invalid_field(field: ConfigField, message: impl Into<String>) -> Self {
        Self::InvalidConfig { field: Some(field), message: message.into() }
    }

    /// Create an invalid config error not tied to a single field.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { field: None, message: message.into() }
    }

    /// Create a config file not found error.
    pub fn config_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigFileNotFound { path: path.into() }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Check username and password".to_string()),
        }
    }

    /// Create an illegal state error.
    pub fn illegal_state(operation: &'static str, state: ConnectionState) -> Self {
        Self::IllegalState { operation, state }
    }

    /// Create a binding error for a count mismatch.
    pub fn binding_count(expected: usize, actual: usize) -> Self {
        Self::Binding {
            expected,
            actual,
            message: format!("statement expects {expected} parameter(s), {actual} supplied"),
        }
    }

    /// Create a binding error for a malformed statement.
    pub fn binding(message: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::Binding { expected, actual, message: message.into() }
    }

    /// Create an execution error with only a message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution { message: message.into(), detail: None, hint: None, position: None, code: None }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Translate a driver error raised while opening a session.
    ///
    /// Anything that is not an authentication failure is a connection error,
    /// including server-side errors such as "database does not exist".
    pub fn from_connect_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            match db_err.code().code() {
                "28P01" => {
                    return DbError::Authentication {
                        message,
                        hint: Some("Invalid password - check your credentials".to_string()),
                    }
                }
                "28000" => {
                    return DbError::Authentication {
                        message,
                        hint: Some(
                            "Authentication failed - check username and permissions".to_string(),
                        ),
                    }
                }
                _ => return DbError::Connection { message, source: Some(Box::new(err)) },
            }
        }

        DbError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }

    // ========== Methods ==========

    /// Get the coarse error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigIncomplete { .. } => ErrorKind::ConfigIncomplete,
            Self::InvalidConfig { .. } | Self::ConfigFileNotFound { .. } => ErrorKind::Config,
            Self::Connection { .. } | Self::Authentication { .. } => ErrorKind::Connection,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::Binding { .. } => ErrorKind::Binding,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error means the session is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigIncomplete { .. } => "Config",
            Self::InvalidConfig { .. } => "Config",
            Self::ConfigFileNotFound { .. } => "Config",
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::IllegalState { .. } => "State",
            Self::Binding { .. } => "Binding",
            Self::Execution { .. } => "Query",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::ConfigIncomplete { .. } => {
                Some("Set the missing values through the environment, conn.json or overrides")
            }
            Self::InvalidConfig { .. } => None,
            Self::ConfigFileNotFound { .. } => Some("Check the config file path"),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::IllegalState { .. } => Some("Call connect() first"),
            Self::Binding { .. } => Some("Pass one parameter per placeholder"),
            Self::Execution { hint, .. } => hint.as_deref(),
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Execution { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Execution { position, .. } => *position,
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Execution { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Self::Binding { expected, actual, .. } => {
                Some(format!("Placeholders: {expected}\nParameters: {actual}"))
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for an expanded view.
    pub technical_detail: Option<String>,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

// ========== Error Conversions ==========

/// Convert a driver error raised while running a statement.
impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();

            if ends_session(code_str) {
                return DbError::Connection {
                    message: db_err.message().to_string(),
                    source: Some(Box::new(err)),
                };
            }

            return DbError::Execution {
                message: db_err.message().to_string(),
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                position,
                code: Some(code_str.to_string()),
            };
        }

        if err.is_closed() {
            return DbError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        // Client-side failures (parameter encoding, row decoding) while the
        // session is still usable.
        DbError::execution(with_source(&err))
    }
}

/// Check if a SQLSTATE means the server ended the session: connection
/// exceptions (08xxx) and operator intervention shutdowns (57P0x).
pub fn ends_session(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("57P")
}

/// Driver message followed by its cause, which tokio-postgres keeps out of
/// `Display` for encoding errors.
fn with_source(err: &tokio_postgres::Error) -> String {
    let message = err.to_string();
    match std::error::Error::source(err) {
        Some(source) => {
            let source = source.to_string();
            if message.contains(&source) {
                message
            } else {
                format!("{message}: {source}")
            }
        }
        None => message,
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::InvalidConfig { field: None, message: err.to_string() }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidConfig { field: None, message: format!("JSON error: {err}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_incomplete_names_every_field() {
        let err = DbError::config_incomplete(vec![ConfigField::Name, ConfigField::Password]);
        assert_eq!(err.to_string(), "Config incomplete: missing name, password");
        assert_eq!(err.kind(), ErrorKind::ConfigIncomplete);
    }

    #[test]
    fn test_illegal_state_message() {
        let err = DbError::illegal_state("run a query", ConnectionState::Closed);
        assert_eq!(err.to_string(), "Cannot run a query while closed");
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert_eq!(err.hint(), Some("Call connect() first"));
    }

    #[test]
    fn test_binding_count_error() {
        let err = DbError::binding_count(2, 3);
        assert_eq!(err.to_string(), "Binding error: statement expects 2 parameter(s), 3 supplied");
        match err {
            DbError::Binding { expected, actual, .. } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_execution_error_info() {
        let err = DbError::Execution {
            message: "relation \"t\" does not exist".to_string(),
            detail: None,
            hint: None,
            position: Some(15),
            code: Some("42P01".to_string()),
        };
        assert_eq!(err.pg_code(), Some("42P01"));
        assert_eq!(err.position(), Some(15));

        let info = err.to_error_info();
        assert_eq!(info.error_type, "Query Error");
        assert_eq!(info.technical_detail.as_deref(), Some("Code: 42P01\nPosition: 15"));
    }

    #[test]
    fn test_authentication_counts_as_connection_kind() {
        let err = DbError::authentication("password authentication failed");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.category(), "Authentication");
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_config_file_not_found_display() {
        let err = DbError::config_file_not_found("/tmp/missing/conn.json");
        assert_eq!(err.to_string(), "Config file not found: /tmp/missing/conn.json");
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_shutdown_sqlstates_end_the_session() {
        assert!(ends_session("08006"));
        assert!(ends_session("57P01"));
        assert!(ends_session("57P02"));
        assert!(!ends_session("57014"));
        assert!(!ends_session("42601"));
    }

    #[test]
    fn test_connection_with_source_keeps_cause() {
        let cause = DbError::execution("terminating connection due to administrator command");
        let err = DbError::connection_with_source(cause.to_string(), cause);
        assert!(err.is_connection_lost());
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()).as_deref(),
            Some("terminating connection due to administrator command")
        );
    }

    #[test]
    fn test_serde_error_is_invalid_config() {
        let err: DbError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, DbError::InvalidConfig { field: None, .. }));
    }
}

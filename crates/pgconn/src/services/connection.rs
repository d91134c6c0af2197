//! Lifecycle of the single database session.
//!
//! The manager is the only owner of the session. Query code borrows it
//! through [`ConnectionManager::session`], which fails unless the manager is
//! `Connected`. Nothing here reconnects on its own.

use crate::error::DbError;
use crate::models::{ConnectionConfig, ConnectionState};
use crate::services::driver::{Driver, Session};
use crate::services::postgres::PostgresDriver;

use chrono::{DateTime, Utc};

/// Owns one session and its state transitions.
pub struct ConnectionManager {
    driver: Box<dyn Driver>,
    state: ConnectionState,
    session: Option<Box<dyn Session>>,
    config: Option<ConnectionConfig>,
    connected_at: Option<DateTime<Utc>>,
}

impl ConnectionManager {
    /// Create a manager backed by the PostgreSQL driver.
    pub fn new() -> Self {
        Self::with_driver(PostgresDriver::new())
    }

    /// Create a manager backed by a custom driver.
    pub fn with_driver(driver: impl Driver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
            state: ConnectionState::Disconnected,
            session: None,
            config: None,
            connected_at: None,
        }
    }

    /// Open a session for `config`.
    ///
    /// On failure the manager is left `Disconnected` and the driver's error
    /// is returned unchanged. Fails with `IllegalState` when a session is
    /// already open.
    pub fn connect(&mut self, config: ConnectionConfig) -> Result<(), DbError> {
        if !self.state.can_connect() {
            return Err(DbError::illegal_state("connect", self.state));
        }

        self.state = ConnectionState::Connecting;
        tracing::debug!(
            url = %config.display_url(),
            driver = self.driver.name(),
            "Connecting"
        );

        match self.driver.open(&config) {
            Ok(session) => {
                tracing::info!(
                    database = %config.name(),
                    host = %config.host(),
                    port = config.port(),
                    "Connected to database"
                );
                self.session = Some(session);
                self.config = Some(config);
                self.connected_at = Some(Utc::now());
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    database = %config.name(),
                    host = %config.host(),
                    error = %e,
                    "Could not connect to database"
                );
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Check if a session is open.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration of the current or most recent session.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// When the current session was opened.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at.filter(|_| self.is_connected())
    }

    /// Release the session. A no-op unless `Connected`.
    ///
    /// The manager ends up `Closed` even if the driver reports an error
    /// while shutting the session down; that error is returned.
    pub fn close(&mut self) -> Result<(), DbError> {
        if !self.state.is_connected() {
            tracing::trace!(state = %self.state, "Close requested without an open session");
            return Ok(());
        }

        self.state = ConnectionState::Closed;
        self.connected_at = None;
        let result = match self.session.take() {
            Some(session) => session.close(),
            None => Ok(()),
        };

        match &result {
            Ok(()) => tracing::info!(
                database = self.config.as_ref().map(ConnectionConfig::name).unwrap_or_default(),
                "Closed connection"
            ),
            Err(e) => tracing::warn!(error = %e, "Error while closing connection"),
        }
        result
    }

    /// Borrow the live session.
    ///
    /// Fails with `IllegalState` unless `Connected`.
    pub fn session(&mut self) -> Result<&mut dyn Session, DbError> {
        if !self.state.is_connected() {
            return Err(DbError::illegal_state("use the session", self.state));
        }
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(DbError::internal("connected without a session")),
        }
    }

    /// Drop a session the driver reported as gone.
    pub fn mark_lost(&mut self) {
        if self.session.take().is_some() {
            tracing::warn!(
                database = self.config.as_ref().map(ConnectionConfig::name).unwrap_or_default(),
                "Connection lost"
            );
        }
        self.connected_at = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close connection on drop");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver.name())
            .field("state", &self.state)
            .field("config", &self.config)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

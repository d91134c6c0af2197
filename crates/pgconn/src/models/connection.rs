//! Connection lifecycle state.

use std::fmt;

/// Current state of the managed session.
///
/// `Connected` is the only state in which statements may run. `Closed`
/// ends a session; a later `connect()` starts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session, never opened or lost
    #[default]
    Disconnected,
    /// Session being opened
    Connecting,
    /// Live session
    Connected,
    /// Session released by `close()`
    Closed,
}

impl ConnectionState {
    /// Check if the connection is active.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the connection is connecting.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Check if the connection is disconnected.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Check if the session was closed by the caller.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if `connect()` may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    /// Lowercase name used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

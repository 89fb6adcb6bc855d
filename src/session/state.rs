//! Observable connection state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the event-stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
        }
    }

    /// Value exported on the connection state gauge.
    pub fn metric_code(&self) -> i64 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Closing => 4,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on every session transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub connection_error: Option<String>,
    pub reconnect_attempts: u32,
    pub is_reconnecting: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// Derive the observable fields from the raw state machine values.
    pub fn derive(
        state: ConnectionState,
        attempt_count: u32,
        last_error: Option<String>,
        last_heartbeat_at: Option<DateTime<Utc>>,
    ) -> Self {
        let is_reconnecting = match state {
            ConnectionState::Reconnecting => true,
            ConnectionState::Connecting => attempt_count > 0,
            _ => false,
        };

        Self {
            state,
            is_connected: state == ConnectionState::Connected,
            connection_error: last_error,
            reconnect_attempts: attempt_count,
            is_reconnecting,
            last_heartbeat_at,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::derive(ConnectionState::Disconnected, 0, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_connected);
        assert!(!status.is_reconnecting);
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[test]
    fn test_retry_in_flight_counts_as_reconnecting() {
        assert!(ConnectionStatus::derive(ConnectionState::Connecting, 2, None, None).is_reconnecting);
        assert!(!ConnectionStatus::derive(ConnectionState::Connecting, 0, None, None).is_reconnecting);
        assert!(ConnectionStatus::derive(ConnectionState::Reconnecting, 1, None, None).is_reconnecting);
    }

    #[test]
    fn test_status_serializes_lowercase_state() {
        let status = ConnectionStatus::derive(
            ConnectionState::Connected,
            0,
            None,
            None,
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["is_connected"], true);
    }
}

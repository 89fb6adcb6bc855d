//! # Resilience Module
//!
//! Reusable resilience patterns for the synchronization core.
//!
//! ## Components
//! - `BackoffPolicy`: capped lookup-table delays between reconnect attempts.
//! - `SyncFailure`: failure taxonomy used for log and metric labels.

pub mod backoff;

// Re-export for convenience
pub use backoff::BackoffPolicy;

/// Failure kinds observed by the synchronization core.
///
/// None of these are thrown to callers; they label log events and metrics
/// and drive the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncFailure {
    /// Timeout or unreachable host; retried by the owner's own cadence
    TransientNetwork,
    /// Malformed payload; message dropped, connection kept
    ProtocolViolation,
    /// Abnormal closure or stale heartbeat; drives reconnection
    ConnectionLost,
    /// Reconnect budget used up; terminal until manual reconnect
    Exhausted,
    /// No identity available; connect is a no-op
    Unauthenticated,
}

impl SyncFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::ProtocolViolation => "protocol_violation",
            Self::ConnectionLost => "connection_lost",
            Self::Exhausted => "exhausted",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

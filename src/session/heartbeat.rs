//! Heartbeat liveness tracking.
//!
//! Any inbound frame counts as a confirmation: the stream multiplexes
//! heartbeat echoes and domain messages on one channel, so a busy
//! connection never needs a dedicated pong to stay fresh.

use std::time::Duration;
use tokio::time::Instant;

/// Tracks when heartbeats were last sent and when liveness was last confirmed.
///
/// Staleness is always derived from `last_confirmed_at`, never stored.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatMonitor {
    last_sent_at: Option<Instant>,
    last_confirmed_at: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `now` as a fresh confirmation, forgetting earlier history.
    ///
    /// Called on entering Connected: the open itself proves liveness.
    pub fn reset(&mut self, now: Instant) {
        self.last_sent_at = None;
        self.last_confirmed_at = Some(now);
    }

    /// Clears all state (connection torn down).
    pub fn clear(&mut self) {
        self.last_sent_at = None;
        self.last_confirmed_at = None;
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent_at = Some(now);
    }

    /// Record inbound traffic. Timestamps never move backwards.
    pub fn record_confirmed(&mut self, now: Instant) {
        match self.last_confirmed_at {
            Some(prev) if prev > now => {}
            _ => self.last_confirmed_at = Some(now),
        }
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn last_confirmed_at(&self) -> Option<Instant> {
        self.last_confirmed_at
    }

    /// True when `now - last_confirmed_at > interval + timeout`.
    ///
    /// A monitor that has never been confirmed is not stale: there is no
    /// connection to judge yet.
    pub fn is_stale(&self, now: Instant, interval: Duration, timeout: Duration) -> bool {
        match self.last_confirmed_at {
            Some(confirmed) => now.saturating_duration_since(confirmed) > interval + timeout,
            None => false,
        }
    }
}

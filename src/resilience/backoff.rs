//! # Reconnect Backoff Policy
//!
//! Maps a reconnect attempt number to the delay before that attempt.
//!
//! Unlike a multiplicative backoff, the delays come from a fixed lookup
//! table. Attempts past the end of the table reuse the last entry, so retry
//! pressure never exceeds the final ceiling.
//!
//! ## Usage
//! ```
//! use orderpulse::resilience::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.next_delay(1), Duration::from_secs(1));
//! assert_eq!(policy.next_delay(99), Duration::from_secs(30));
//! ```

use std::time::Duration;

/// Default delay table in seconds.
pub const DEFAULT_DELAYS_SECS: [u64; 6] = [1, 2, 5, 10, 15, 30];

/// Default number of automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Capped lookup-table backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Ordered delays; never empty
    delays: Vec<Duration>,
    /// Automatic attempts allowed before the session reports exhaustion
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy from an explicit delay table.
    ///
    /// An empty table falls back to the default table.
    pub fn new(delays: Vec<Duration>, max_attempts: u32) -> Self {
        if delays.is_empty() {
            tracing::warn!("Empty backoff table supplied, using default delays");
            return Self {
                max_attempts,
                ..Self::default()
            };
        }
        Self {
            delays,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt_count` (1-based).
    ///
    /// Attempt 1 waits the first table entry; attempt 0 is treated as 1.
    /// Total: always returns a value.
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        let last = self.delays.len().saturating_sub(1);
        let index = (attempt_count.saturating_sub(1) as usize).min(last);
        self.delays
            .get(index)
            .copied()
            .unwrap_or(Duration::from_secs(DEFAULT_DELAYS_SECS[0]))
    }

    /// Returns true once `attempt_count` attempts have been used up.
    pub fn is_exhausted(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The largest delay the policy will ever return.
    pub fn ceiling(&self) -> Duration {
        self.next_delay(u32::MAX)
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

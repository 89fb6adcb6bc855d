//! Rate-limited logging utilities.
//!
//! Provides `LogThrottle` to prevent log storms from a misbehaving stream
//! while still tracking how many messages were suppressed.

use std::time::{Duration, Instant};

/// A lightweight rate limiter for logging to prevent log storms.
#[derive(Debug)]
pub struct LogThrottle {
    last_log_time: Option<Instant>,
    suppressed_count: u64,
    interval: Duration,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_log_time: None,
            suppressed_count: 0,
            interval,
        }
    }

    /// Checks if a log should be emitted.
    /// Returns true if the interval has passed since the last log.
    /// If false, increments the suppressed counter.
    pub fn should_log(&mut self) -> bool {
        let now = Instant::now();
        match self.last_log_time {
            Some(last) if now.duration_since(last) < self.interval => {
                self.suppressed_count += 1;
                false
            }
            _ => {
                self.last_log_time = Some(now);
                true
            }
        }
    }

    /// Returns the number of suppressed logs since the last successful log, and resets the counter.
    pub fn get_and_reset_suppressed_count(&mut self) -> u64 {
        let count = self.suppressed_count;
        self.suppressed_count = 0;
        count
    }
}

/// Throttlers for the noisy warnings of one stream session.
#[derive(Debug)]
pub struct StreamLogThrottler {
    /// Malformed payloads
    pub protocol_violation: LogThrottle,
    /// Messages with an unrecognised `type`
    pub unknown_message: LogThrottle,
    /// Frames arriving while not connected
    pub unexpected_frame: LogThrottle,
    /// Stream updates dropped on a full reconciler queue
    pub dropped_update: LogThrottle,
}

impl StreamLogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            protocol_violation: LogThrottle::new(interval),
            unknown_message: LogThrottle::new(interval),
            unexpected_frame: LogThrottle::new(interval),
            dropped_update: LogThrottle::new(interval),
        }
    }
}

impl Default for StreamLogThrottler {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

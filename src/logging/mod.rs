//! Logging Module
//!
//! Provides rate limiting for log lines that a misbehaving stream could
//! otherwise emit once per frame:
//! - `LogThrottle` - single rate limiter with suppressed-count tracking
//! - `StreamLogThrottler` - the set of throttles used by a stream session

pub mod throttle;

pub use throttle::{LogThrottle, StreamLogThrottler};

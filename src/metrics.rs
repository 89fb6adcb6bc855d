//! Prometheus Metrics Module
//!
//! Pre-registered metrics for production observability.
//! All metrics use lock-free atomics for minimal hot-path overhead.

use lazy_static::lazy_static;
use prometheus::{
    opts, register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge,
    TextEncoder,
};

lazy_static! {
    // --- Stream Metrics ---

    /// Inbound stream messages (by message type)
    pub static ref STREAM_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_stream_messages_total", "Inbound event-stream messages"),
        &["type"]
    ).expect("FATAL: Failed to register STREAM_MESSAGES_TOTAL metric - check for duplicate registration");

    /// Dropped malformed payloads
    pub static ref PROTOCOL_VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_protocol_violations_total", "Malformed event-stream payloads dropped"),
        &["reason"]
    ).expect("FATAL: Failed to register PROTOCOL_VIOLATIONS_TOTAL metric - check for duplicate registration");

    // --- Connection Metrics ---

    /// Reconnect scheduling outcomes
    pub static ref RECONNECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_reconnections_total", "Reconnect attempts by outcome"),
        &["status"]
    ).expect("FATAL: Failed to register RECONNECTIONS_TOTAL metric - check for duplicate registration");

    /// Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=closing)
    pub static ref CONNECTION_STATE: IntGauge = register_int_gauge!(
        opts!("orderpulse_connection_state", "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=closing)")
    ).expect("FATAL: Failed to register CONNECTION_STATE metric - check for duplicate registration");

    // --- Poll Metrics ---

    /// Poll ticks by outcome (success, failure, skipped)
    pub static ref POLLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_polls_total", "Order poll ticks by outcome"),
        &["status"]
    ).expect("FATAL: Failed to register POLLS_TOTAL metric - check for duplicate registration");

    // --- Reconciliation Metrics ---

    /// Emitted status-change events (by winning source and new status)
    pub static ref STATUS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_status_events_total", "Deduplicated status-change events"),
        &["source", "status"]
    ).expect("FATAL: Failed to register STATUS_EVENTS_TOTAL metric - check for duplicate registration");

    /// Notifications handed to the dispatcher
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("orderpulse_notifications_total", "Notifications dispatched"),
        &["status"]
    ).expect("FATAL: Failed to register NOTIFICATIONS_TOTAL metric - check for duplicate registration");
}

/// Record an inbound stream message
pub fn record_stream_message(kind: &str) {
    STREAM_MESSAGES_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a dropped malformed payload
pub fn record_protocol_violation(reason: &str) {
    PROTOCOL_VIOLATIONS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a reconnect outcome ("scheduled", "exhausted", "manual")
pub fn record_reconnect(status: &str) {
    RECONNECTIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Update the connection state gauge
pub fn set_connection_state(code: i64) {
    CONNECTION_STATE.set(code);
}

/// Record a poll tick outcome
pub fn record_poll(status: &str) {
    POLLS_TOTAL.with_label_values(&[status]).inc();
}

/// Record an emitted status-change event
pub fn record_status_event(source: &str, status: &str) {
    STATUS_EVENTS_TOTAL.with_label_values(&[source, status]).inc();
}

/// Record a notification dispatch
pub fn record_notification(success: bool) {
    let status = if success { "success" } else { "failure" };
    NOTIFICATIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Get metrics as text for /metrics endpoint
///
/// Encoding errors are logged and yield an empty body.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode Prometheus metrics: {}", e);
        return String::new();
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Prometheus metrics buffer is not valid UTF-8: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        // Trigger lazy initialization of at least one metric
        record_poll("success");

        let output = gather_metrics();
        assert!(
            output.contains("orderpulse_polls_total"),
            "Expected metrics output to contain 'orderpulse_polls_total', got: {}",
            &output[..output.len().min(200)]
        );
    }
}

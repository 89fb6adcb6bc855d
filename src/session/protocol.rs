//! Event-stream wire protocol.
//!
//! ## Inbound messages
//! - `{"type":"connected"}`
//! - `{"type":"heartbeat","timestamp":...}` / `{"type":"echo","timestamp":...}`
//! - `{"type":"order_status_update","orderId":"...","orderStatus":"READY","title":"...","message":"..."}`
//!
//! Unknown `type` values parse to [`InboundMessage::Unknown`] and are
//! ignored by the session; malformed payloads are a [`ProtocolError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::orders::{OrderId, OrderStatus};

/// Payload could not be understood. The message is dropped, the connection kept.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame has no string 'type' field")]
    MissingType,

    #[error("Malformed '{kind}' message: {reason}")]
    Malformed { kind: String, reason: String },
}

/// Status push for one order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Server acknowledged the subscription
    Connected,
    /// Server heartbeat or echo of ours
    Heartbeat { timestamp: Option<i64> },
    /// Order status push
    OrderStatus(OrderStatusUpdate),
    /// Any other `type`; logged and ignored
    Unknown(String),
}

impl InboundMessage {
    /// Metric label. Unknown types share one label; the raw type is only
    /// carried by the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Heartbeat { .. } => "heartbeat",
            Self::OrderStatus(_) => "order_status_update",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Parse one raw text frame.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    match kind {
        "connected" => Ok(InboundMessage::Connected),
        "heartbeat" | "echo" => Ok(InboundMessage::Heartbeat {
            timestamp: value.get("timestamp").and_then(Value::as_i64),
        }),
        "order_status_update" => {
            let kind = kind.to_string();
            serde_json::from_value::<OrderStatusUpdate>(value)
                .map(InboundMessage::OrderStatus)
                .map_err(|e| ProtocolError::Malformed {
                    kind,
                    reason: e.to_string(),
                })
        }
        other => Ok(InboundMessage::Unknown(other.to_string())),
    }
}

/// Outbound heartbeat frame.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: i64,
}

impl HeartbeatFrame {
    pub fn new(timestamp_millis: i64) -> Self {
        Self {
            kind: "heartbeat",
            timestamp: timestamp_millis,
        }
    }

    pub fn to_text(&self) -> String {
        // Serialising a struct of a str and an i64 cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"heartbeat","timestamp":{}}}"#, self.timestamp)
        })
    }
}

//! Transport Abstraction Layer
//!
//! The session never talks to a socket directly. A [`Transport`] opens a
//! bidirectional text channel for a user and hands back a [`TransportLink`]:
//! commands flow out through `commands`, lifecycle and data events flow in
//! through `events`.
//!
//! Opening is non-blocking: establishment (or failure) is reported later as
//! `TransportEvent::Opened` or `TransportEvent::Closed`.

pub mod memory;
pub mod websocket;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::UserId;

pub use memory::{MemoryTransport, RemoteEnd};
pub use websocket::WebSocketTransport;

/// Normal closure; never triggers a reconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (client-initiated teardown of a dead link).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Abnormal closure: no close frame, connection dropped.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Errors raised by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport link closed")]
    LinkClosed,
}

/// Commands accepted by an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a raw text frame
    Text(String),
    /// Close the connection with the given code
    Close { code: u16, reason: String },
}

/// Events emitted by a link, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established
    Opened,
    /// Raw inbound text frame
    Message(String),
    /// Transport-level error; a `Closed` event follows when fatal
    Error(String),
    /// Connection finished. Always the last event of a link.
    Closed { code: u16, reason: String },
}

impl TransportEvent {
    pub fn abnormal_close(reason: impl Into<String>) -> Self {
        Self::Closed {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
        }
    }
}

/// One logical connection attempt.
pub struct TransportLink {
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Build a link plus the transport-side ends of its channels.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<TransportCommand>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: command_tx,
                events: event_rx,
            },
            command_rx,
            event_tx,
        )
    }
}

/// Opens event-stream connections for a user.
pub trait Transport: Send + Sync {
    /// Start opening a connection. Must not block.
    fn open(&self, user_id: &UserId) -> TransportLink;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_pair_wiring() {
        let (mut link, mut commands, events) = TransportLink::pair();

        events.send(TransportEvent::Opened).unwrap();
        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));

        link.commands
            .send(TransportCommand::Text("hello".to_string()))
            .unwrap();
        assert_eq!(
            commands.recv().await,
            Some(TransportCommand::Text("hello".to_string()))
        );
    }

    #[test]
    fn test_abnormal_close_code() {
        assert_eq!(
            TransportEvent::abnormal_close("gone"),
            TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: "gone".to_string()
            }
        );
    }
}

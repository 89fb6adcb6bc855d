//! WebSocket Transport
//!
//! Order-status event stream over a native WebSocket connection.
//!
//! ## WebSocket Flow
//! 1. Connect to `{endpoint}/{user_id}`
//! 2. Receive `{"type":"connected"}`
//! 3. Exchange `{"type":"heartbeat","timestamp":...}` frames every interval
//! 4. Receive `{"type":"order_status_update",...}` pushes
//!
//! Reconnection is not handled here: every failure ends the link with a
//! `Closed` event and the session decides what to do next.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, error, info, warn};

use super::{
    Transport, TransportCommand, TransportError, TransportEvent, TransportLink, CLOSE_ABNORMAL,
    CLOSE_NORMAL,
};
use crate::types::UserId;

/// Close code reported when the server closes without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// WebSocket implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// Create a transport for a `ws://` or `wss://` base endpoint.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(TransportError::InvalidEndpoint(endpoint));
        }
        info!(endpoint = %endpoint, "Creating WebSocket transport");
        Ok(Self { endpoint })
    }

    /// Full URL for a user's stream.
    pub fn url_for(&self, user_id: &UserId) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), user_id)
    }

    async fn run_link(
        url: String,
        mut commands: mpsc::UnboundedReceiver<TransportCommand>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(url = %url, error = %e, "WebSocket connection failed");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                let _ = events.send(TransportEvent::abnormal_close("connect failed"));
                return;
            }
        };

        info!(url = %url, "WebSocket connected");
        if events.send(TransportEvent::Opened).is_err() {
            return;
        }

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(TransportCommand::Text(text)) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                warn!(error = %e, "Failed to send frame");
                                let _ = events.send(TransportEvent::Error(e.to_string()));
                                let _ = events.send(TransportEvent::abnormal_close("send failed"));
                                return;
                            }
                        }
                        Some(TransportCommand::Close { code, reason }) => {
                            debug!(code, reason = %reason, "Closing WebSocket");
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.clone().into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            let _ = write.close().await;
                            let _ = events.send(TransportEvent::Closed { code, reason });
                            return;
                        }
                        None => {
                            // Session dropped the link without an explicit close
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if events.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                                return;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => {
                                    if events.send(TransportEvent::Message(text)).is_err() {
                                        return;
                                    }
                                }
                                Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            debug!("Received ping, sending pong");
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                warn!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                .unwrap_or((CLOSE_NO_STATUS, String::new()));
                            if code == CLOSE_NORMAL {
                                info!("WebSocket closed by server");
                            } else {
                                warn!(code, reason = %reason, "WebSocket closed by server");
                            }
                            let _ = events.send(TransportEvent::Closed { code, reason });
                            return;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            let _ = events.send(TransportEvent::Closed {
                                code: CLOSE_ABNORMAL,
                                reason: "transport error".to_string(),
                            });
                            return;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            let _ = events.send(TransportEvent::abnormal_close("stream ended"));
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, user_id: &UserId) -> TransportLink {
        let (link, commands, events) = TransportLink::pair();
        let url = self.url_for(user_id);
        tokio::spawn(Self::run_link(url, commands, events));
        link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        assert!(matches!(
            WebSocketTransport::new("https://api.example.com"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_url_for_user() {
        let transport = WebSocketTransport::new("wss://stream.example.com/ws/").unwrap();
        assert_eq!(
            transport.url_for(&UserId::new("user-7")),
            "wss://stream.example.com/ws/user-7"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_abnormal_close() {
        // Port 9 (discard) on localhost is not listening in test environments
        let transport = WebSocketTransport::new("ws://127.0.0.1:9").unwrap();
        let mut link = transport.open(&UserId::new("user-1"));

        let mut saw_error = false;
        while let Some(event) = link.events.recv().await {
            match event {
                TransportEvent::Error(_) => saw_error = true,
                TransportEvent::Closed { code, .. } => {
                    assert_eq!(code, CLOSE_ABNORMAL);
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(saw_error);
    }
}

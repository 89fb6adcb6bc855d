//! Event-stream connection session.
//!
//! - `heartbeat` - liveness bookkeeping
//! - `protocol` - inbound/outbound wire messages
//! - `state` - observable connection state
//! - `connection` - the session actor and its handle

pub mod connection;
pub mod heartbeat;
pub mod protocol;
pub mod state;

pub use connection::{
    spawn_session, SessionConfig, SessionError, SessionHandle, EXHAUSTED_ERROR,
    MIN_HEARTBEAT_INTERVAL,
};
pub use heartbeat::HeartbeatMonitor;
pub use protocol::{parse_inbound, HeartbeatFrame, InboundMessage, OrderStatusUpdate, ProtocolError};
pub use state::{ConnectionState, ConnectionStatus};

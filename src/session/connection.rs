//! Connection session actor.
//!
//! One task owns the whole connection state machine. Callers talk to it
//! through a [`SessionHandle`]; transport events and timer ticks are fed
//! back into the same task, so every transition runs on a single owner.
//!
//! Timers and links are tagged with generation counters. Cancelling bumps
//! the counter and aborts the task, and anything that still arrives under
//! an old generation is ignored.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::heartbeat::HeartbeatMonitor;
use super::protocol::{parse_inbound, HeartbeatFrame, InboundMessage, ProtocolError};
use super::state::{ConnectionState, ConnectionStatus};
use crate::identity::IdentityProvider;
use crate::logging::StreamLogThrottler;
use crate::metrics;
use crate::orders::reconciler::{SignalSender, StatusSignal, StreamStatus, SubmitError};
use crate::resilience::{BackoffPolicy, SyncFailure};
use crate::transport::{
    Transport, TransportCommand, TransportEvent, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};

const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Error surfaced once the reconnect budget is spent.
pub const EXHAUSTED_ERROR: &str = "unable to reconnect";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is not connected")]
    NotConnected,

    #[error("Session task has stopped")]
    Closed,
}

/// Session timing and retry configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between outbound heartbeats
    pub heartbeat_interval: Duration,
    /// Grace period on top of the interval before the link is declared dead
    pub heartbeat_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Shortest heartbeat period a session will run with.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

impl SessionConfig {
    /// Clamp values the timers cannot run with.
    pub fn normalized(mut self) -> Self {
        if self.heartbeat_interval < MIN_HEARTBEAT_INTERVAL {
            warn!(
                configured = ?self.heartbeat_interval,
                using = ?MIN_HEARTBEAT_INTERVAL,
                "Heartbeat interval too short, clamping"
            );
            self.heartbeat_interval = MIN_HEARTBEAT_INTERVAL;
        }
        self
    }
}

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<()>),
    SendRaw(String, oneshot::Sender<Result<(), SessionError>>),
    AppBecameActive,
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Heartbeat,
    Reconnect,
}

enum Internal {
    Transport { generation: u64, event: TransportEvent },
    Timer { generation: u64, kind: TimerKind },
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl SessionHandle {
    async fn request(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Start connecting. No-op unless Disconnected, or without a user.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(Command::Connect).await
    }

    /// Close the connection and suppress automatic reconnection.
    ///
    /// Returns after timers are cancelled and the transport is closed.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(Command::Disconnect).await
    }

    /// Tear down and reconnect immediately with a fresh attempt budget.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.request(Command::Reconnect).await
    }

    /// Send a raw text frame on the open connection.
    pub async fn send_raw(&self, message: impl Into<String>) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SendRaw(message.into(), tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// App returned to the foreground.
    pub async fn app_became_active(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::AppBecameActive)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Disconnect and stop the session task. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.request(Command::Shutdown).await.is_err() {
            debug!("Session already stopped");
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected
    }

    pub fn connection_error(&self) -> Option<String> {
        self.status.borrow().connection_error.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.status.borrow().reconnect_attempts
    }

    pub fn is_reconnecting(&self) -> bool {
        self.status.borrow().is_reconnecting
    }

    /// Watch every status transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `pred`.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&ConnectionStatus) -> bool,
    ) -> Result<ConnectionStatus, SessionError> {
        let mut rx = self.status.clone();
        let status = rx.wait_for(pred).await.map_err(|_| SessionError::Closed)?;
        Ok(status.clone())
    }
}

/// Spawn the session actor. The session starts Disconnected.
pub fn spawn_session(
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    signals: SignalSender,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

    let actor = SessionActor {
        config: config.normalized(),
        transport,
        identity,
        signals,
        state: ConnectionState::Disconnected,
        attempt_count: 0,
        last_error: None,
        last_heartbeat_at: None,
        suppressed: false,
        exhausted: false,
        heartbeat: HeartbeatMonitor::new(),
        link: None,
        link_forwarder: None,
        link_generation: 0,
        timer_generation: 0,
        heartbeat_timer: None,
        reconnect_timer: None,
        internal_tx,
        status_tx,
        throttle: StreamLogThrottler::default(),
    };
    metrics::set_connection_state(ConnectionState::Disconnected.metric_code());

    let task = tokio::spawn(actor.run(command_rx, internal_rx));
    (
        SessionHandle {
            commands: command_tx,
            status: status_rx,
        },
        task,
    )
}

struct SessionActor {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    signals: SignalSender,

    state: ConnectionState,
    attempt_count: u32,
    last_error: Option<String>,
    last_heartbeat_at: Option<chrono::DateTime<Utc>>,
    /// Set by disconnect(); cleared only by connect() or reconnect()
    suppressed: bool,
    /// Reconnect budget spent; only an explicit connect or reconnect retries
    exhausted: bool,
    heartbeat: HeartbeatMonitor,

    link: Option<mpsc::UnboundedSender<TransportCommand>>,
    link_forwarder: Option<JoinHandle<()>>,
    link_generation: u64,
    timer_generation: u64,
    heartbeat_timer: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,

    internal_tx: mpsc::UnboundedSender<Internal>,
    status_tx: watch::Sender<ConnectionStatus>,
    throttle: StreamLogThrottler,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => {
                        info!("Session shutting down");
                        self.disconnect();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All session handles dropped");
                        self.disconnect();
                        break;
                    }
                },
                Some(message) = internal.recv() => match message {
                    Internal::Transport { generation, event } => {
                        self.handle_transport(generation, event).await
                    }
                    Internal::Timer { generation, kind } => self.handle_timer(generation, kind),
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(ack) => {
                if self.state == ConnectionState::Disconnected {
                    self.suppressed = false;
                    self.exhausted = false;
                    self.attempt_count = 0;
                    self.begin_connect();
                } else {
                    debug!(state = %self.state, "connect() ignored, session not disconnected");
                }
                let _ = ack.send(());
            }
            Command::Disconnect(ack) => {
                self.disconnect();
                let _ = ack.send(());
            }
            Command::Reconnect(ack) => {
                info!(state = %self.state, "Manual reconnect requested");
                metrics::record_reconnect("manual");
                self.suppressed = false;
                self.exhausted = false;
                self.attempt_count = 0;
                self.last_error = None;
                self.cancel_timers();
                self.teardown_link(Some((CLOSE_NORMAL, "reconnect")));
                self.begin_connect();
                let _ = ack.send(());
            }
            Command::SendRaw(text, reply) => {
                let _ = reply.send(self.send_text(text));
            }
            Command::AppBecameActive => self.resume(),
            Command::Shutdown(ack) => {
                // Handled by the run loop
                let _ = ack.send(());
            }
        }
    }

    /// Foreground resumption.
    fn resume(&mut self) {
        if self.suppressed {
            debug!("App active, reconnection suppressed by disconnect()");
            return;
        }
        match self.state {
            ConnectionState::Disconnected if self.exhausted => {
                debug!("App active, reconnect budget exhausted");
            }
            ConnectionState::Disconnected => {
                info!("App active while disconnected, connecting");
                self.attempt_count = 0;
                self.begin_connect();
            }
            ConnectionState::Reconnecting => {
                info!(attempt = self.attempt_count, "App active, retrying now");
                self.cancel_timers();
                self.begin_connect();
            }
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing => {}
        }
    }

    fn begin_connect(&mut self) {
        let Some(user_id) = self.identity.current_user() else {
            debug!("No authenticated user, not connecting");
            self.teardown_link(None);
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        self.teardown_link(None);
        self.cancel_timers();

        info!(user_id = %user_id, attempt = self.attempt_count, "Connecting to event stream");
        let link = self.transport.open(&user_id);
        self.link_generation += 1;
        let generation = self.link_generation;
        let tx = self.internal_tx.clone();
        let mut events = link.events;
        self.link = Some(link.commands);
        self.link_forwarder = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(Internal::Transport { generation, event }).is_err() {
                    return;
                }
            }
            // Transport dropped the link without a close event
            let _ = tx.send(Internal::Transport {
                generation,
                event: TransportEvent::abnormal_close("link dropped"),
            });
        }));

        self.set_state(ConnectionState::Connecting);
    }

    async fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.link_generation || self.link.is_none() {
            debug!(generation, current = self.link_generation, "Ignoring event from stale link");
            return;
        }

        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(raw) => self.on_message(&raw),
            TransportEvent::Error(e) => {
                warn!(error = %e, "Transport error");
                self.last_error = Some(e);
                self.publish();
            }
            TransportEvent::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring open outside Connecting");
            return;
        }

        info!(previous_attempts = self.attempt_count, "Event stream connected");
        self.attempt_count = 0;
        self.exhausted = false;
        self.last_error = None;
        self.heartbeat.reset(Instant::now());
        self.last_heartbeat_at = Some(Utc::now());
        self.cancel_timers();
        self.heartbeat_timer = Some(self.spawn_heartbeat_timer());
        self.set_state(ConnectionState::Connected);
    }

    fn on_message(&mut self, raw: &str) {
        if self.state != ConnectionState::Connected {
            if self.throttle.unexpected_frame.should_log() {
                let suppressed = self.throttle.unexpected_frame.get_and_reset_suppressed_count();
                warn!(state = %self.state, suppressed, "Dropping frame received before open");
            }
            return;
        }

        self.heartbeat.record_confirmed(Instant::now());
        self.last_heartbeat_at = Some(Utc::now());
        self.publish();

        match parse_inbound(raw) {
            Ok(message) => {
                metrics::record_stream_message(message.kind());
                self.dispatch(message);
            }
            Err(e) => self.protocol_violation(e),
        }
    }

    fn dispatch(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Connected => debug!("Server acknowledged subscription"),
            InboundMessage::Heartbeat { timestamp } => debug!(?timestamp, "Heartbeat received"),
            InboundMessage::OrderStatus(update) => {
                info!(
                    order_id = %update.order_id,
                    status = %update.order_status,
                    "Order status pushed"
                );
                let signal = StatusSignal::Stream(StreamStatus {
                    order_id: update.order_id,
                    status: update.order_status,
                    title: update.title,
                    message: update.message,
                });
                // The actor never waits on sinks; the poller covers a dropped push
                match self.signals.try_submit(signal) {
                    Ok(()) => {}
                    Err(SubmitError::QueueFull) => {
                        if self.throttle.dropped_update.should_log() {
                            let suppressed =
                                self.throttle.dropped_update.get_and_reset_suppressed_count();
                            warn!(suppressed, "Reconciler queue full, dropping stream status");
                        }
                    }
                    Err(SubmitError::Stopped) => warn!("Reconciler stopped, dropping stream status"),
                }
            }
            InboundMessage::Unknown(kind) => {
                if self.throttle.unknown_message.should_log() {
                    let suppressed = self.throttle.unknown_message.get_and_reset_suppressed_count();
                    debug!(kind = %kind, suppressed, "Ignoring unknown message type");
                }
            }
        }
    }

    fn protocol_violation(&mut self, e: ProtocolError) {
        let reason = match &e {
            ProtocolError::InvalidJson(_) => "invalid_json",
            ProtocolError::MissingType => "missing_type",
            ProtocolError::Malformed { .. } => "malformed",
        };
        metrics::record_protocol_violation(reason);
        if self.throttle.protocol_violation.should_log() {
            let suppressed = self.throttle.protocol_violation.get_and_reset_suppressed_count();
            warn!(
                error = %e,
                failure = %SyncFailure::ProtocolViolation,
                suppressed,
                "Dropping malformed stream message"
            );
        }
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        self.teardown_link(None);

        if code == CLOSE_NORMAL {
            info!(reason = %reason, "Event stream closed normally");
            self.cancel_timers();
            self.heartbeat.clear();
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        let error = if reason.is_empty() {
            format!("connection closed (code {})", code)
        } else {
            format!("connection closed (code {}): {}", code, reason)
        };
        warn!(code, reason = %reason, failure = %SyncFailure::ConnectionLost, "Event stream lost");
        self.connection_lost(error);
    }

    fn handle_timer(&mut self, generation: u64, kind: TimerKind) {
        if generation != self.timer_generation {
            debug!(?kind, generation, "Ignoring stale timer");
            return;
        }

        match (kind, self.state) {
            (TimerKind::Heartbeat, ConnectionState::Connected) => self.heartbeat_tick(),
            (TimerKind::Reconnect, ConnectionState::Reconnecting) => {
                info!(attempt = self.attempt_count, "Reconnect timer fired");
                self.begin_connect();
            }
            (kind, state) => debug!(?kind, %state, "Timer not applicable in current state"),
        }
    }

    fn heartbeat_tick(&mut self) {
        let now = Instant::now();
        if self.heartbeat.is_stale(
            now,
            self.config.heartbeat_interval,
            self.config.heartbeat_timeout,
        ) {
            warn!(failure = %SyncFailure::ConnectionLost, "Heartbeat stale, dropping connection");
            self.teardown_link(Some((CLOSE_GOING_AWAY, "heartbeat timeout")));
            self.connection_lost("heartbeat timeout".to_string());
            return;
        }

        let frame = HeartbeatFrame::new(Utc::now().timestamp_millis()).to_text();
        match self.send_text(frame) {
            Ok(()) => self.heartbeat.record_sent(now),
            Err(e) => debug!(error = %e, "Heartbeat not sent"),
        }
    }

    /// Abnormal loss while Connected or Connecting: schedule a retry or give up.
    fn connection_lost(&mut self, error: String) {
        self.cancel_timers();
        self.heartbeat.clear();
        self.last_error = Some(error);

        if self.suppressed {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        if self.config.backoff.is_exhausted(self.attempt_count) {
            error!(
                attempts = self.attempt_count,
                failure = %SyncFailure::Exhausted,
                "Reconnect attempts exhausted"
            );
            metrics::record_reconnect("exhausted");
            self.exhausted = true;
            self.last_error = Some(EXHAUSTED_ERROR.to_string());
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.attempt_count += 1;
        let delay = self.config.backoff.next_delay(self.attempt_count);
        info!(
            attempt = self.attempt_count,
            max_attempts = self.config.backoff.max_attempts(),
            delay_secs = delay.as_secs_f64(),
            "Scheduling reconnect"
        );
        metrics::record_reconnect("scheduled");
        self.reconnect_timer = Some(self.spawn_timer(delay, TimerKind::Reconnect));
        self.set_state(ConnectionState::Reconnecting);
    }

    fn disconnect(&mut self) {
        self.suppressed = true;
        self.cancel_timers();
        if self.link.is_some() {
            self.set_state(ConnectionState::Closing);
            self.teardown_link(Some((CLOSE_NORMAL, "client disconnect")));
        }
        self.heartbeat.clear();
        self.last_error = None;
        self.set_state(ConnectionState::Disconnected);
        info!("Session disconnected");
    }

    fn send_text(&self, text: String) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.send(TransportCommand::Text(text))
            .map_err(|_| SessionError::NotConnected)
    }

    /// Drop the current link, optionally asking the transport to close it first.
    fn teardown_link(&mut self, close: Option<(u16, &str)>) {
        if let Some(link) = self.link.take() {
            if let Some((code, reason)) = close {
                let _ = link.send(TransportCommand::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
        }
        if let Some(forwarder) = self.link_forwarder.take() {
            forwarder.abort();
        }
        self.link_generation += 1;
    }

    fn cancel_timers(&mut self) {
        self.timer_generation += 1;
        if let Some(timer) = self.heartbeat_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn spawn_timer(&self, delay: Duration, kind: TimerKind) -> JoinHandle<()> {
        let generation = self.timer_generation;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::Timer { generation, kind });
        })
    }

    fn spawn_heartbeat_timer(&self) -> JoinHandle<()> {
        let generation = self.timer_generation;
        let period = self.config.heartbeat_interval;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let tick = Internal::Timer {
                    generation,
                    kind: TimerKind::Heartbeat,
                };
                if tx.send(tick).is_err() {
                    return;
                }
            }
        })
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state change");
            self.state = state;
            metrics::set_connection_state(state.metric_code());
        }
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(ConnectionStatus::derive(
            self.state,
            self.attempt_count,
            self.last_error.clone(),
            self.last_heartbeat_at,
        ));
    }
}

impl Drop for SessionActor {
    fn drop(&mut self) {
        self.cancel_timers();
        if let Some(forwarder) = self.link_forwarder.take() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_heartbeat_interval_is_clamped() {
        let config = SessionConfig {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.heartbeat_interval, MIN_HEARTBEAT_INTERVAL);

        let untouched = SessionConfig::default().normalized();
        assert_eq!(untouched.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(untouched.heartbeat_timeout, Duration::from_secs(10));
    }
}

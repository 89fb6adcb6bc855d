//! Order-status reconciliation between the event stream and polling.
//!
//! Both channels report the same facts independently. The reconciler keeps
//! the last status surfaced for each order and emits an event only when an
//! observation differs from it, so whichever source sees a transition first
//! wins and the other source's report of the same status is a no-op.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{OrderId, OrderSnapshot, OrderStatus, StatusChangeEvent, StatusSource};
use crate::metrics;
use crate::notify::StatusEventSink;

/// Capacity of the reconciler's input queue.
const SIGNAL_QUEUE_CAPACITY: usize = 1024;

/// A status push for a single order from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub title: Option<String>,
    pub message: Option<String>,
}

impl StreamStatus {
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            title: None,
            message: None,
        }
    }
}

/// Raw observation handed to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSignal {
    /// Single-order notification
    Stream(StreamStatus),
    /// Full order list from one poll
    Poll(Vec<OrderSnapshot>),
}

impl StatusSignal {
    pub fn source(&self) -> StatusSource {
        match self {
            Self::Stream(_) => StatusSource::Stream,
            Self::Poll(_) => StatusSource::Poll,
        }
    }
}

/// Compare-and-emit status deduplication.
///
/// Holds the known-status table: order id to last surfaced status. Entries
/// are only created when a status is surfaced and live until [`reset`]
/// (logout / session end). Terminal entries are kept so late reports of a
/// finished order stay silent.
///
/// [`reset`]: StatusReconciler::reset
#[derive(Debug, Default)]
pub struct StatusReconciler {
    known: HashMap<OrderId, OrderStatus>,
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one signal, returning the new transitions in input order.
    pub fn reconcile(&mut self, signal: StatusSignal) -> Vec<StatusChangeEvent> {
        match signal {
            StatusSignal::Stream(update) => {
                let StreamStatus {
                    order_id,
                    status,
                    title,
                    message,
                } = update;
                self.observe(order_id, status, StatusSource::Stream)
                    .map(|mut event| {
                        event.title = title;
                        event.message = message;
                        event
                    })
                    .into_iter()
                    .collect()
            }
            StatusSignal::Poll(snapshots) => snapshots
                .into_iter()
                .filter_map(|s| self.observe(s.id, s.status, StatusSource::Poll))
                .collect(),
        }
    }

    fn observe(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        source: StatusSource,
    ) -> Option<StatusChangeEvent> {
        let previous = self.known.get(&order_id).copied();
        if previous == Some(status) {
            debug!(order_id = %order_id, status = %status, source = %source, "Status already known");
            return None;
        }

        if let Some(prev) = previous {
            if prev.is_terminal() {
                warn!(
                    order_id = %order_id,
                    previous = %prev,
                    new = %status,
                    "Status change reported for an order already in a terminal state"
                );
            }
        }

        self.known.insert(order_id.clone(), status);
        Some(StatusChangeEvent::new(order_id, previous, status, source))
    }

    /// Last surfaced status for an order.
    pub fn known_status(&self, order_id: &OrderId) -> Option<OrderStatus> {
        self.known.get(order_id).copied()
    }

    /// Number of orders in the known-status table.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Forget everything (logout / session end).
    pub fn reset(&mut self) {
        let cleared = self.known.len();
        self.known.clear();
        info!(cleared, "Known-status table cleared");
    }
}

enum ReconcilerInput {
    Signal(StatusSignal),
    Reset,
}

/// Producer side of the reconciler queue.
///
/// Holders can only push signals in; they never see the known-status table.
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<ReconcilerInput>,
}

impl SignalSender {
    /// Queue a signal. Returns false if the reconciler has stopped.
    pub async fn submit(&self, signal: StatusSignal) -> bool {
        if self.tx.send(ReconcilerInput::Signal(signal)).await.is_err() {
            warn!("Reconciler stopped, dropping status signal");
            return false;
        }
        true
    }

    /// Queue a signal without waiting for room.
    ///
    /// For producers that must not stall behind slow sinks.
    pub fn try_submit(&self, signal: StatusSignal) -> Result<(), SubmitError> {
        self.tx
            .try_send(ReconcilerInput::Signal(signal))
            .map_err(|e| match e {
                TrySendError::Full(_) => SubmitError::QueueFull,
                TrySendError::Closed(_) => SubmitError::Stopped,
            })
    }
}

/// Why a non-blocking submit was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("reconciler queue is full")]
    QueueFull,

    #[error("reconciler has stopped")]
    Stopped,
}

/// Handle to the running reconciler task.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcilerInput>,
}

impl ReconcilerHandle {
    /// A sender for a signal producer (session or poller).
    pub fn signal_sender(&self) -> SignalSender {
        SignalSender {
            tx: self.tx.clone(),
        }
    }

    /// Clear the known-status table. Queued behind pending signals.
    pub async fn reset(&self) {
        if self.tx.send(ReconcilerInput::Reset).await.is_err() {
            debug!("Reconciler already stopped, nothing to reset");
        }
    }
}

/// Serialises all `reconcile` calls on a single consumer task.
///
/// The session's timers and the poller's timer run independently; funnelling
/// both through one queue makes the known-status table single-writer.
pub struct ReconcilerService;

impl ReconcilerService {
    /// Spawn the reconciler task. Events are published to `sink` in order,
    /// each fully delivered before the next signal is processed.
    ///
    /// The task ends once every `ReconcilerHandle` and `SignalSender` is dropped.
    pub fn spawn<S>(sink: S) -> (ReconcilerHandle, JoinHandle<()>)
    where
        S: StatusEventSink + 'static,
    {
        let (tx, mut rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);

        let task = tokio::spawn(async move {
            let mut reconciler = StatusReconciler::new();
            while let Some(input) = rx.recv().await {
                match input {
                    ReconcilerInput::Signal(signal) => {
                        let source = signal.source();
                        let events = reconciler.reconcile(signal);
                        for event in events {
                            info!(
                                order_id = %event.order_id,
                                previous = ?event.previous_status,
                                new = %event.new_status,
                                source = %event.source,
                                "Order status changed"
                            );
                            metrics::record_status_event(source.as_str(), event.new_status.as_str());
                            if let Err(e) = sink.publish(&event).await {
                                warn!(order_id = %event.order_id, error = %e, "Failed to publish status event");
                            }
                        }
                    }
                    ReconcilerInput::Reset => reconciler.reset(),
                }
            }
            debug!("Reconciler task finished");
        });

        (ReconcilerHandle { tx }, task)
    }
}

//! Status Event Delivery
//!
//! Provides a pluggable `StatusEventSink` trait through which the reconciler
//! hands out every `StatusChangeEvent`:
//! - `OrderStateStore` - applies the transition to the order list
//! - `StatusNotifier` - turns the transition into a user-visible notification
//! - `ChannelSink` - forwards events to an mpsc receiver
//! - `MultiSink` - fans out to several sinks in order

pub mod notifier;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::orders::StatusChangeEvent;

pub use notifier::{Notification, NotificationDispatcher, StatusNotifier, TracingDispatcher};

/// Error type for event delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Receiver closed")]
    ReceiverClosed,

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Consumer of reconciled status transitions.
#[async_trait]
pub trait StatusEventSink: Send + Sync {
    /// Deliver one event. Called exactly once per event.
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: StatusEventSink + ?Sized> StatusEventSink for Arc<T> {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError> {
        (**self).publish(event).await
    }
}

/// A sink that fans out to multiple sinks, in registration order.
pub struct MultiSink {
    sinks: Vec<Box<dyn StatusEventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn StatusEventSink>>) -> Self {
        Self { sinks }
    }

    pub fn add(&mut self, sink: Box<dyn StatusEventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl StatusEventSink for MultiSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError> {
        let mut error_count = 0;
        let mut last_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                // Best-effort: one failing consumer must not starve the others
                tracing::error!(order_id = %event.order_id, error = %e, "Sink failed to accept status event");
                last_error = Some(e);
                error_count += 1;
            }
        }

        if error_count > 0 && error_count == self.sinks.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(())
    }
}

/// Forwards events into an mpsc channel.
pub struct ChannelSink {
    tx: mpsc::Sender<StatusChangeEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StatusChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusEventSink for ChannelSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| NotifyError::ReceiverClosed)
    }
}

//! Order Status Module
//!
//! Tracks the status of the user's orders from two independent channels
//! and surfaces each real transition exactly once.
//!
//! # Architecture
//!
//! - `StatusReconciler` / `ReconcilerService` - compare-and-emit deduplication
//! - `ActiveOrderPoller` - periodic re-fetch while any order is in flight
//! - `OrderStateStore` - authoritative in-memory order list
//! - `OrderSource` - the order-resource collaborator (`HttpOrderSource`)
//! - Core types - `OrderId`, `OrderStatus`, `OrderSnapshot`, `StatusChangeEvent`
//!
//! # Example
//!
//! ```ignore
//! use orderpulse::orders::{StatusReconciler, StatusSignal, StreamStatus, OrderId, OrderStatus};
//!
//! let mut reconciler = StatusReconciler::new();
//! let events = reconciler.reconcile(StatusSignal::Stream(StreamStatus::new(
//!     OrderId::new("order-456"),
//!     OrderStatus::Ready,
//! )));
//! assert_eq!(events.len(), 1);
//! ```

pub mod poller;
pub mod reconciler;
pub mod source;
pub mod store;
mod types;

pub use poller::{ActiveOrderPoller, PollerConfig, PollerHandle};
pub use reconciler::{
    ReconcilerHandle, ReconcilerService, SignalSender, StatusReconciler, StatusSignal,
    StreamStatus, SubmitError,
};
pub use source::{HttpOrderSource, OrderSource, OrderSourceError};
pub use store::{OrderStateStore, OrderStoreError};
pub use types::{
    OrderId, OrderSnapshot, OrderStatus, StatusChangeEvent, StatusSource, TrackedOrder,
};

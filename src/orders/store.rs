//! Authoritative in-memory order list.
//!
//! The store applies reconciled `StatusChangeEvent`s and refreshes
//! descriptive order data from poll snapshots. It publishes an activation
//! counter that ticks whenever an order becomes active, which is what wakes
//! an idle poller.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use super::types::{OrderId, OrderSnapshot, OrderStatus, StatusChangeEvent, TrackedOrder};
use crate::notify::{NotifyError, StatusEventSink};
use crate::types::RestaurantId;

/// Errors returned by store queries.
#[derive(Error, Debug, Clone)]
pub enum OrderStoreError {
    /// Order not found in store
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Timeout waiting for order to reach a status
    #[error("Timeout waiting for order {0} to reach {1}")]
    Timeout(OrderId, OrderStatus),
}

/// Thread-safe order-state store.
///
/// Status changes only arrive through [`apply`](Self::apply), i.e. from the
/// reconciler. Snapshot refreshes never overwrite the status of an order
/// that is already tracked.
pub struct OrderStateStore {
    orders: RwLock<HashMap<OrderId, TrackedOrder>>,
    /// Incremented each time an order becomes active
    activations: watch::Sender<u64>,
}

impl Default for OrderStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStateStore {
    pub fn new() -> Self {
        let (activations, _) = watch::channel(0);
        Self {
            orders: RwLock::new(HashMap::new()),
            activations,
        }
    }

    /// Receiver that changes whenever a new active order appears.
    pub fn subscribe_activations(&self) -> watch::Receiver<u64> {
        self.activations.subscribe()
    }

    fn bump_activations(&self) {
        self.activations.send_modify(|count| *count += 1);
    }

    /// Apply a reconciled status transition.
    pub async fn apply(&self, event: &StatusChangeEvent) -> TrackedOrder {
        let mut orders = self.orders.write().await;
        let was_active = orders
            .get(&event.order_id)
            .map(|o| o.status.is_active())
            .unwrap_or(false);

        let order = orders
            .entry(event.order_id.clone())
            .or_insert_with(|| TrackedOrder::from_status(event.order_id.clone(), event.new_status));
        let old_status = order.status;
        order.status = event.new_status;
        order.updated_at = Utc::now();
        let updated = order.clone();
        drop(orders);

        debug!(
            order_id = %event.order_id,
            old_status = %old_status,
            new_status = %event.new_status,
            source = %event.source,
            "Order status applied"
        );

        if !was_active && event.new_status.is_active() {
            self.bump_activations();
        }
        updated
    }

    /// Start tracking an order the user just placed.
    ///
    /// Overwrites any existing entry for the same id.
    pub async fn track(&self, snapshot: &OrderSnapshot) {
        let mut orders = self.orders.write().await;
        let was_active = orders
            .get(&snapshot.id)
            .map(|o| o.status.is_active())
            .unwrap_or(false);
        orders.insert(snapshot.id.clone(), TrackedOrder::from_snapshot(snapshot));
        drop(orders);

        info!(order_id = %snapshot.id, status = %snapshot.status, "Order tracked");
        if !was_active && snapshot.status.is_active() {
            self.bump_activations();
        }
    }

    /// Refresh restaurant, amount and creation time from poll snapshots.
    ///
    /// Unknown orders are inserted with their snapshot status; known orders
    /// keep their status.
    pub async fn refresh_metadata(&self, snapshots: &[OrderSnapshot]) {
        let mut orders = self.orders.write().await;
        let mut activated = false;
        for snapshot in snapshots {
            match orders.get_mut(&snapshot.id) {
                Some(order) => {
                    order.restaurant_id = Some(snapshot.restaurant_id.clone());
                    order.total_amount = Some(snapshot.total_amount);
                    order.created_at = Some(snapshot.created_at);
                }
                None => {
                    activated |= snapshot.status.is_active();
                    orders.insert(snapshot.id.clone(), TrackedOrder::from_snapshot(snapshot));
                }
            }
        }
        drop(orders);

        if activated {
            self.bump_activations();
        }
    }

    pub async fn get(&self, id: &OrderId) -> Option<TrackedOrder> {
        let orders = self.orders.read().await;
        orders.get(id).cloned()
    }

    pub async fn restaurant_of(&self, id: &OrderId) -> Option<RestaurantId> {
        let orders = self.orders.read().await;
        orders.get(id).and_then(|o| o.restaurant_id.clone())
    }

    /// All non-terminal orders.
    pub async fn active_orders(&self) -> Vec<TrackedOrder> {
        let orders = self.orders.read().await;
        orders
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    pub async fn has_active(&self) -> bool {
        let orders = self.orders.read().await;
        orders.values().any(|o| o.status.is_active())
    }

    #[must_use]
    pub async fn order_count(&self) -> usize {
        let orders = self.orders.read().await;
        orders.len()
    }

    /// Wait until an order reaches `status`.
    pub async fn wait_for_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        timeout: Duration,
    ) -> Result<TrackedOrder, OrderStoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_millis(50);

        loop {
            if let Some(order) = self.get(id).await {
                if order.status == status {
                    return Ok(order);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return match self.get(id).await {
                    Some(_) => Err(OrderStoreError::Timeout(id.clone(), status)),
                    None => Err(OrderStoreError::OrderNotFound(id.clone())),
                };
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Drop all orders (logout / session end).
    pub async fn clear(&self) {
        let mut orders = self.orders.write().await;
        orders.clear();
    }
}

#[async_trait]
impl StatusEventSink for OrderStateStore {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError> {
        self.apply(event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::StatusSource;
    use rust_decimal_macros::dec;

    fn snapshot(id: &str, status: OrderStatus) -> OrderSnapshot {
        OrderSnapshot {
            id: OrderId::new(id),
            restaurant_id: RestaurantId::new("resto-1"),
            status,
            total_amount: dec!(31.20),
            created_at: Utc::now(),
        }
    }

    fn event(id: &str, prev: Option<OrderStatus>, new: OrderStatus) -> StatusChangeEvent {
        StatusChangeEvent::new(OrderId::new(id), prev, new, StatusSource::Stream)
    }

    #[tokio::test]
    async fn test_apply_creates_and_updates_orders() {
        let store = OrderStateStore::new();
        store
            .apply(&event("order-1", None, OrderStatus::Pending))
            .await;
        assert!(store.has_active().await);

        let updated = store
            .apply(&event(
                "order-1",
                Some(OrderStatus::Pending),
                OrderStatus::Completed,
            ))
            .await;
        assert_eq!(updated.status, OrderStatus::Completed);
        assert!(!store.has_active().await);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_activation_counter_only_ticks_on_new_active_orders() {
        let store = OrderStateStore::new();
        let rx = store.subscribe_activations();

        store.track(&snapshot("order-1", OrderStatus::Pending)).await;
        assert_eq!(*rx.borrow(), 1);

        // Still active: no new activation
        store
            .apply(&event(
                "order-1",
                Some(OrderStatus::Pending),
                OrderStatus::Preparing,
            ))
            .await;
        assert_eq!(*rx.borrow(), 1);

        // Terminal: no activation
        store
            .apply(&event(
                "order-1",
                Some(OrderStatus::Preparing),
                OrderStatus::Completed,
            ))
            .await;
        assert_eq!(*rx.borrow(), 1);

        store
            .apply(&event("order-2", None, OrderStatus::Confirmed))
            .await;
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_refresh_metadata_keeps_known_status() {
        let store = OrderStateStore::new();
        store
            .apply(&event("order-1", None, OrderStatus::Ready))
            .await;

        store
            .refresh_metadata(&[snapshot("order-1", OrderStatus::Preparing)])
            .await;

        let order = store.get(&OrderId::new("order-1")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Ready);
        assert_eq!(order.restaurant_id, Some(RestaurantId::new("resto-1")));
        assert_eq!(order.total_amount, Some(dec!(31.20)));
        assert_eq!(
            store.restaurant_of(&OrderId::new("order-1")).await,
            Some(RestaurantId::new("resto-1"))
        );
    }

    #[tokio::test]
    async fn test_wait_for_status_times_out() {
        let store = OrderStateStore::new();
        store.track(&snapshot("order-1", OrderStatus::Pending)).await;

        let result = store
            .wait_for_status(
                &OrderId::new("order-1"),
                OrderStatus::Ready,
                Duration::from_millis(120),
            )
            .await;
        assert!(matches!(result, Err(OrderStoreError::Timeout(_, _))));

        let missing = store
            .wait_for_status(
                &OrderId::new("order-x"),
                OrderStatus::Ready,
                Duration::from_millis(60),
            )
            .await;
        assert!(matches!(missing, Err(OrderStoreError::OrderNotFound(_))));
    }
}

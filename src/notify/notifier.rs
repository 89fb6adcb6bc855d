//! Notification boundary.
//!
//! `StatusNotifier` is the trigger side of user-visible notifications: it
//! receives each reconciled transition exactly once and hands a rendered
//! `Notification` to a `NotificationDispatcher`. Delivery to the device
//! (push registration, permission prompts) lives behind the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{NotifyError, StatusEventSink};
use crate::catalog::RestaurantDirectory;
use crate::metrics;
use crate::orders::{OrderId, OrderStateStore, OrderStatus, StatusChangeEvent};

/// A rendered, user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub title: String,
    pub body: String,
}

/// Delivers notifications to the user.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Dispatcher that emits structured tracing logs.
pub struct TracingDispatcher;

impl TracingDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            target: "notifications",
            order_id = %notification.order_id,
            status = %notification.status,
            title = %notification.title,
            body = %notification.body,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Renders status transitions into notifications.
///
/// Server-supplied title and message win; otherwise the copy is built
/// from the status, enriched with the restaurant name when the order's
/// restaurant is known to both the store and the directory.
pub struct StatusNotifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    store: Arc<OrderStateStore>,
    directory: Arc<RestaurantDirectory>,
}

impl StatusNotifier {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        store: Arc<OrderStateStore>,
        directory: Arc<RestaurantDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            directory,
        }
    }

    async fn restaurant_name(&self, order_id: &OrderId) -> Option<String> {
        let restaurant_id = self.store.restaurant_of(order_id).await?;
        self.directory.name_of(&restaurant_id)
    }

    /// Build the notification for one transition.
    pub async fn render(&self, event: &StatusChangeEvent) -> Notification {
        let restaurant = self.restaurant_name(&event.order_id).await;
        let (default_title, default_body) = default_copy(event.new_status, restaurant.as_deref());

        Notification {
            order_id: event.order_id.clone(),
            status: event.new_status,
            title: event.title.clone().unwrap_or(default_title),
            body: event.message.clone().unwrap_or(default_body),
        }
    }
}

fn default_copy(status: OrderStatus, restaurant: Option<&str>) -> (String, String) {
    let place = restaurant.unwrap_or("the restaurant");
    match status {
        OrderStatus::Pending => (
            "Order received".to_string(),
            format!("We've sent your order to {}.", place),
        ),
        OrderStatus::Confirmed => (
            "Order confirmed".to_string(),
            format!("{} accepted your order.", capitalize(place)),
        ),
        OrderStatus::Preparing => (
            "Preparing your order".to_string(),
            format!("{} is preparing your food.", capitalize(place)),
        ),
        OrderStatus::Ready => (
            "Order ready".to_string(),
            format!("Your order from {} is ready.", place),
        ),
        OrderStatus::Completed => (
            "Order completed".to_string(),
            "Enjoy your meal!".to_string(),
        ),
        OrderStatus::Cancelled => (
            "Order cancelled".to_string(),
            format!("Your order from {} was cancelled.", place),
        ),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[async_trait]
impl StatusEventSink for StatusNotifier {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<(), NotifyError> {
        let notification = self.render(event).await;
        let result = self.dispatcher.dispatch(notification).await;
        metrics::record_notification(result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{OrderSnapshot, StatusSource};
    use crate::types::RestaurantId;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
            self.sent.lock().await.push(notification);
            Ok(())
        }
    }

    async fn notifier_with_restaurant() -> (StatusNotifier, Arc<RecordingDispatcher>) {
        let store = Arc::new(OrderStateStore::new());
        store
            .track(&OrderSnapshot {
                id: OrderId::new("order-1"),
                restaurant_id: RestaurantId::new("resto-1"),
                status: OrderStatus::Pending,
                total_amount: dec!(12.00),
                created_at: Utc::now(),
            })
            .await;
        let directory = Arc::new(RestaurantDirectory::with_entries([("resto-1", "Luigi's")]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        (
            StatusNotifier::new(dispatcher.clone(), store, directory),
            dispatcher,
        )
    }

    #[tokio::test]
    async fn test_default_copy_uses_restaurant_name() {
        let (notifier, dispatcher) = notifier_with_restaurant().await;
        let event = StatusChangeEvent::new(
            OrderId::new("order-1"),
            Some(OrderStatus::Preparing),
            OrderStatus::Ready,
            StatusSource::Poll,
        );

        notifier.publish(&event).await.unwrap();

        let sent = dispatcher.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Order ready");
        assert_eq!(sent[0].body, "Your order from Luigi's is ready.");
    }

    #[tokio::test]
    async fn test_server_copy_wins() {
        let (notifier, _) = notifier_with_restaurant().await;
        let mut event = StatusChangeEvent::new(
            OrderId::new("order-1"),
            None,
            OrderStatus::Confirmed,
            StatusSource::Stream,
        );
        event.title = Some("Great news".to_string());
        event.message = Some("Luigi is on it".to_string());

        let notification = notifier.render(&event).await;
        assert_eq!(notification.title, "Great news");
        assert_eq!(notification.body, "Luigi is on it");
    }

    #[tokio::test]
    async fn test_unknown_restaurant_falls_back() {
        let (notifier, _) = notifier_with_restaurant().await;
        let event = StatusChangeEvent::new(
            OrderId::new("order-unknown"),
            None,
            OrderStatus::Confirmed,
            StatusSource::Poll,
        );
        let notification = notifier.render(&event).await;
        assert_eq!(notification.body, "The restaurant accepted your order.");
    }
}

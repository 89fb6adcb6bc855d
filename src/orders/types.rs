//! Core types for order-status synchronization.
//!
//! Provides type-safe order identifiers, the order status lifecycle and the
//! events produced by status reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::RestaurantId;

/// Type-safe order identifier (server-assigned).
///
/// Uses a newtype wrapper to prevent accidentally mixing order IDs
/// with other string types at compile time.
///
/// # Example
///
/// ```
/// use orderpulse::orders::OrderId;
///
/// let id = OrderId::new("order-456");
/// assert_eq!(id.as_str(), "order-456");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new OrderId from any string-like type.
    ///
    /// # Panics
    ///
    /// Debug builds will panic if the ID is empty. Release builds log a warning.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let s: String = id.into();
        debug_assert!(!s.is_empty(), "OrderId cannot be empty");
        if s.is_empty() {
            tracing::warn!("Creating OrderId with empty string - this may cause tracking issues");
        }
        Self(s)
    }

    /// Get the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner String.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order lifecycle states as reported by the server.
///
/// `Completed` and `Cancelled` are terminal: no further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, awaiting restaurant acknowledgment
    Pending,
    /// Restaurant accepted the order
    Confirmed,
    /// Kitchen is preparing the order
    Preparing,
    /// Order ready for pickup or hand-off
    Ready,
    /// Order delivered / collected
    Completed,
    /// Order cancelled by user or restaurant
    Cancelled,
}

impl OrderStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Ready,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Returns true if the order can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if the order is still in flight (poller keeps running).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Wire representation (`"PENDING"`, `"READY"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "PREPARING" => Ok(Self::Preparing),
            "READY" => Ok(Self::Ready),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("Unknown order status: '{}'", other)),
        }
    }
}

/// Server-side view of one order, as returned by the order resource.
///
/// Read-only to the synchronization core: reconciliation only looks at
/// `id` and `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Which channel observed a status transition first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    /// Push message on the event stream
    Stream,
    /// Periodic re-fetch of the order list
    Poll,
}

impl StatusSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Poll => "poll",
        }
    }
}

impl std::fmt::Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, deduplicated order-status transition.
///
/// Produced only by the reconciler; delivered once to the order-state store
/// and once to the notification boundary. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeEvent {
    pub order_id: OrderId,
    /// `None` when this is the first status observed for the order this session
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub source: StatusSource,
    /// Server-supplied notification title (stream only)
    pub title: Option<String>,
    /// Server-supplied notification body (stream only)
    pub message: Option<String>,
}

impl StatusChangeEvent {
    pub fn new(
        order_id: OrderId,
        previous_status: Option<OrderStatus>,
        new_status: OrderStatus,
        source: StatusSource,
    ) -> Self {
        Self {
            order_id,
            previous_status,
            new_status,
            source,
            title: None,
            message: None,
        }
    }
}

/// Order as held by the order-state store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    pub restaurant_id: Option<RestaurantId>,
    pub total_amount: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
    /// Last time the status or metadata changed
    pub updated_at: DateTime<Utc>,
}

impl TrackedOrder {
    /// Create a tracked order from a status observation only.
    pub fn from_status(id: OrderId, status: OrderStatus) -> Self {
        Self {
            id,
            status,
            restaurant_id: None,
            total_amount: None,
            created_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Create a tracked order from a full snapshot.
    pub fn from_snapshot(snapshot: &OrderSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            status: snapshot.status,
            restaurant_id: Some(snapshot.restaurant_id.clone()),
            total_amount: Some(snapshot.total_amount),
            created_at: Some(snapshot.created_at),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
        ] {
            assert!(status.is_active(), "{} should be active", status);
        }
    }

    #[test]
    fn test_status_from_str_is_case_insensitive() {
        assert_eq!("ready".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert_eq!(
            " Cancelled ".parse::<OrderStatus>().unwrap(),
            OrderStatus::Cancelled
        );
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_snapshot_deserializes_camel_case() {
        let json = r#"{
            "id": "order-1",
            "restaurantId": "resto-9",
            "status": "PREPARING",
            "totalAmount": "24.50",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        let snapshot: OrderSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.id, OrderId::new("order-1"));
        assert_eq!(snapshot.restaurant_id, RestaurantId::new("resto-9"));
        assert_eq!(snapshot.status, OrderStatus::Preparing);
        assert_eq!(snapshot.total_amount, dec!(24.50));
    }
}

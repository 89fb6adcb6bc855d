//! End-to-end behaviour of the sync runtime: stream and poll feeding one
//! reconciler, and the poller idling once every order is terminal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use orderpulse::catalog::RestaurantDirectory;
use orderpulse::identity::StaticIdentity;
use orderpulse::notify::{ChannelSink, Notification, NotificationDispatcher, NotifyError, StatusEventSink};
use orderpulse::orders::{
    ActiveOrderPoller, OrderId, OrderSnapshot, OrderSource, OrderSourceError, OrderStateStore,
    OrderStatus, PollerConfig, ReconcilerService, StatusChangeEvent, StatusSource,
};
use orderpulse::runtime::{SyncComponents, SyncRuntime};
use orderpulse::session::SessionConfig;
use orderpulse::transport::MemoryTransport;
use orderpulse::types::{RestaurantId, UserId};
use rust_decimal_macros::dec;

// --- Test doubles ---

/// Order API returning whatever the test last stored.
struct ScriptedSource {
    orders: Mutex<Vec<OrderSnapshot>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn new(orders: Vec<OrderSnapshot>) -> Self {
        Self {
            orders: Mutex::new(orders),
            fetches: AtomicUsize::new(0),
        }
    }

    fn set(&self, orders: Vec<OrderSnapshot>) {
        *self.orders.lock().unwrap() = orders;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderSource for ScriptedSource {
    async fn fetch_orders_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Vec<OrderSnapshot>, OrderSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.orders.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

fn snapshot(id: &str, status: OrderStatus) -> OrderSnapshot {
    OrderSnapshot {
        id: OrderId::new(id),
        restaurant_id: RestaurantId::new("resto-1"),
        status,
        total_amount: dec!(18.50),
        created_at: Utc::now(),
    }
}

async fn next_event(events: &mut tokio::sync::mpsc::Receiver<StatusChangeEvent>) -> StatusChangeEvent {
    events.recv().await.expect("event channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_stream_and_poll_surface_each_transition_once() {
    let (transport, mut remotes) = MemoryTransport::new();
    let source = Arc::new(ScriptedSource::new(vec![snapshot(
        "order-456",
        OrderStatus::Pending,
    )]));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let directory = Arc::new(RestaurantDirectory::with_entries([("resto-1", "Luigi's")]));
    let (observer, mut events) = ChannelSink::new(64);
    let extra_sinks: Vec<Box<dyn StatusEventSink>> = vec![Box::new(observer)];

    let mut runtime = SyncRuntime::start(
        SessionConfig::default(),
        PollerConfig::default(),
        SyncComponents {
            transport: Arc::new(transport),
            source: source.clone(),
            identity: Arc::new(StaticIdentity::user("user-1")),
            dispatcher: dispatcher.clone(),
            directory,
            extra_sinks,
        },
    )
    .await;

    // Discovery fetch at start-up
    let first = next_event(&mut events).await;
    assert_eq!(first.new_status, OrderStatus::Pending);
    assert_eq!(first.previous_status, None);
    assert_eq!(first.source, StatusSource::Poll);

    let remote = remotes.recv().await.unwrap();
    remote.open();
    runtime.session().wait_for(|s| s.is_connected).await.unwrap();

    // Stream sees READY first
    remote.send_text(r#"{"type":"order_status_update","orderId":"order-456","orderStatus":"READY"}"#);
    let ready = next_event(&mut events).await;
    assert_eq!(ready.order_id, OrderId::new("order-456"));
    assert_eq!(ready.previous_status, Some(OrderStatus::Pending));
    assert_eq!(ready.new_status, OrderStatus::Ready);
    assert_eq!(ready.source, StatusSource::Stream);

    // The 15s poll reports the same READY: nothing new
    source.set(vec![snapshot("order-456", OrderStatus::Ready)]);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(source.fetches(), 2);
    assert!(events.try_recv().is_err());

    // Poll sees COMPLETED before the stream does
    source.set(vec![snapshot("order-456", OrderStatus::Completed)]);
    tokio::time::sleep(Duration::from_secs(15)).await;
    let completed = next_event(&mut events).await;
    assert_eq!(completed.previous_status, Some(OrderStatus::Ready));
    assert_eq!(completed.new_status, OrderStatus::Completed);
    assert_eq!(completed.source, StatusSource::Poll);

    // A late stream push of the same status is a no-op
    remote.send_text(r#"{"type":"order_status_update","orderId":"order-456","orderStatus":"COMPLETED"}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(events.try_recv().is_err());

    let tracked = runtime.store().get(&OrderId::new("order-456")).await.unwrap();
    assert_eq!(tracked.status, OrderStatus::Completed);
    assert_eq!(tracked.restaurant_id, Some(RestaurantId::new("resto-1")));

    {
        let sent = dispatcher.sent.lock().unwrap();
        let statuses: Vec<OrderStatus> = sent.iter().map(|n| n.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Pending, OrderStatus::Ready, OrderStatus::Completed]
        );
        assert!(sent[1].body.contains("Luigi's"));
    }

    // Everything terminal: the poller stops fetching
    let fetches = source.fetches();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(source.fetches(), fetches);

    runtime.shutdown().await;
    assert!(runtime.is_shut_down());
    assert_eq!(runtime.store().order_count().await, 0);
    assert!(runtime.directory().is_empty());
    assert!(!runtime.session().is_connected());

    // Second shutdown is a no-op
    runtime.shutdown().await;
    assert!(runtime.is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_idle_poller_resumes_on_new_active_order() {
    let source = Arc::new(ScriptedSource::new(vec![snapshot(
        "order-1",
        OrderStatus::Completed,
    )]));
    let store = Arc::new(OrderStateStore::new());
    let (sink, _events) = ChannelSink::new(64);
    let (reconciler, _task) = ReconcilerService::spawn(sink);

    let mut poller = ActiveOrderPoller::new(
        PollerConfig::default(),
        source.clone(),
        Arc::new(StaticIdentity::user("user-1")),
        store.clone(),
        reconciler.signal_sender(),
    )
    .spawn();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(source.fetches(), 1);
    assert!(poller.is_running());

    // A new order placed elsewhere becomes active
    source.set(vec![
        snapshot("order-1", OrderStatus::Completed),
        snapshot("order-2", OrderStatus::Confirmed),
    ]);
    store
        .apply(&StatusChangeEvent::new(
            OrderId::new("order-2"),
            None,
            OrderStatus::Confirmed,
            StatusSource::Stream,
        ))
        .await;

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(source.fetches(), 2);
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(source.fetches(), 3);

    poller.stop();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!poller.is_running());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.fetches(), 3);
}

//! Active-order poller.
//!
//! Re-fetches the user's orders on a fixed cadence while at least one order
//! is in flight, as a safety net for pushes lost on the event stream. Once
//! every order is terminal the poller stops scheduling entirely and sleeps
//! until the order-state store reports a newly active order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reconciler::{SignalSender, StatusSignal};
use super::source::OrderSource;
use super::store::OrderStateStore;
use crate::identity::IdentityProvider;
use crate::metrics;

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between fetches while orders are active
    pub interval: Duration,
    /// Fetch once immediately on start to discover in-flight orders
    pub poll_on_start: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            poll_on_start: true,
        }
    }
}

/// Periodic re-fetch of the user's orders.
pub struct ActiveOrderPoller {
    config: PollerConfig,
    source: Arc<dyn OrderSource>,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<OrderStateStore>,
    signals: SignalSender,
}

impl ActiveOrderPoller {
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn OrderSource>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<OrderStateStore>,
        signals: SignalSender,
    ) -> Self {
        Self {
            config,
            source,
            identity,
            store,
            signals,
        }
    }

    /// Run one fetch. Returns whether polling should continue.
    ///
    /// Failed or skipped ticks keep the previous decision: the next tick is
    /// the retry.
    pub async fn tick(&self, currently_active: bool) -> bool {
        let Some(user_id) = self.identity.current_user() else {
            debug!("No authenticated user, skipping poll");
            metrics::record_poll("skipped");
            return currently_active;
        };

        match self.source.fetch_orders_for_user(&user_id).await {
            Ok(snapshots) => {
                metrics::record_poll("success");
                let active = snapshots.iter().any(|s| s.status.is_active());
                debug!(
                    user_id = %user_id,
                    orders = snapshots.len(),
                    active,
                    "Poll completed"
                );
                self.store.refresh_metadata(&snapshots).await;
                self.signals.submit(StatusSignal::Poll(snapshots)).await;
                active
            }
            Err(e) => {
                metrics::record_poll("failure");
                warn!(
                    user_id = %user_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Order poll failed, skipping tick"
                );
                currently_active
            }
        }
    }

    /// Poll until the task is aborted.
    pub async fn run(self) {
        let mut activations = self.store.subscribe_activations();

        let mut active = if self.config.poll_on_start {
            activations.borrow_and_update();
            self.tick(true).await
        } else {
            self.store.has_active().await
        };

        loop {
            if active {
                tokio::time::sleep(self.config.interval).await;
            } else {
                info!("No active orders, poller idle");
                if !Self::wait_for_activation(&mut activations).await {
                    debug!("Order store dropped, poller stopping");
                    return;
                }
                info!("Active order appeared, poller resuming");
                tokio::time::sleep(self.config.interval).await;
            }
            // Activations before this fetch are covered by its result
            activations.borrow_and_update();
            active = self.tick(active).await;
        }
    }

    async fn wait_for_activation(activations: &mut watch::Receiver<u64>) -> bool {
        activations.changed().await.is_ok()
    }

    /// Spawn the poller on the runtime.
    pub fn spawn(self) -> PollerHandle {
        PollerHandle {
            task: Some(tokio::spawn(self.run())),
        }
    }
}

/// Owns the poller task.
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            info!("Stopping order poller");
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::notify::ChannelSink;
    use crate::orders::reconciler::ReconcilerService;
    use crate::orders::source::OrderSourceError;
    use crate::orders::{OrderId, OrderSnapshot, OrderStatus};
    use crate::types::{RestaurantId, UserId};
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use rust_decimal_macros::dec;

    mock! {
        pub Source {}

        #[async_trait]
        impl OrderSource for Source {
            async fn fetch_orders_for_user(
                &self,
                user_id: &UserId,
            ) -> Result<Vec<OrderSnapshot>, OrderSourceError>;
        }
    }

    fn snapshot(id: &str, status: OrderStatus) -> OrderSnapshot {
        OrderSnapshot {
            id: OrderId::new(id),
            restaurant_id: RestaurantId::new("resto-1"),
            status,
            total_amount: dec!(9.99),
            created_at: Utc::now(),
        }
    }

    fn poller(source: MockSource, identity: StaticIdentity) -> ActiveOrderPoller {
        let (sink, _rx) = ChannelSink::new(16);
        let (handle, _task) = ReconcilerService::spawn(sink);
        ActiveOrderPoller::new(
            PollerConfig::default(),
            Arc::new(source),
            Arc::new(identity),
            Arc::new(OrderStateStore::new()),
            handle.signal_sender(),
        )
    }

    #[tokio::test]
    async fn test_tick_reports_active_orders() {
        let mut source = MockSource::new();
        source
            .expect_fetch_orders_for_user()
            .times(1)
            .returning(|_| Ok(vec![snapshot("order-1", OrderStatus::Preparing)]));

        let poller = poller(source, StaticIdentity::user("user-1"));
        assert!(poller.tick(false).await);
    }

    #[tokio::test]
    async fn test_tick_all_terminal_goes_idle() {
        let mut source = MockSource::new();
        source.expect_fetch_orders_for_user().times(1).returning(|_| {
            Ok(vec![
                snapshot("order-1", OrderStatus::Completed),
                snapshot("order-2", OrderStatus::Cancelled),
            ])
        });

        let poller = poller(source, StaticIdentity::user("user-1"));
        assert!(!poller.tick(true).await);
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_previous_decision() {
        let mut source = MockSource::new();
        source
            .expect_fetch_orders_for_user()
            .times(1)
            .returning(|_| Err(OrderSourceError::TransientNetwork("timeout".to_string())));

        let poller = poller(source, StaticIdentity::user("user-1"));
        assert!(poller.tick(true).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_discovered_order_completes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut source = MockSource::new();
        source.expect_fetch_orders_for_user().returning(move |_| {
            // Discovery sees the order in flight, every later fetch sees it done
            let status = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                OrderStatus::Preparing
            } else {
                OrderStatus::Completed
            };
            Ok(vec![snapshot("order-1", status)])
        });

        let mut handle = poller(source, StaticIdentity::user("user-1")).spawn();

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The discovery fetch's own activation must not wake the idle poller
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handle.is_running());
        handle.stop();
    }

    #[tokio::test]
    async fn test_unauthenticated_tick_does_not_fetch() {
        let mut source = MockSource::new();
        source.expect_fetch_orders_for_user().times(0);

        let poller = poller(source, StaticIdentity::anonymous());
        assert!(!poller.tick(false).await);
    }
}

//! Sync runtime.
//!
//! Wires one user's session together: the order-state store and notifier
//! behind the reconciler, the event-stream session and the active-order
//! poller feeding it. Everything here is scoped to the session and is torn
//! down by [`SyncRuntime::shutdown`].

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::catalog::RestaurantDirectory;
use crate::identity::IdentityProvider;
use crate::notify::{MultiSink, NotificationDispatcher, StatusEventSink, StatusNotifier};
use crate::orders::{
    ActiveOrderPoller, OrderSource, OrderStateStore, PollerConfig, PollerHandle,
    ReconcilerHandle, ReconcilerService,
};
use crate::session::{spawn_session, ConnectionStatus, SessionConfig, SessionHandle};
use crate::transport::Transport;

/// External collaborators of a runtime.
pub struct SyncComponents {
    pub transport: Arc<dyn Transport>,
    pub source: Arc<dyn OrderSource>,
    pub identity: Arc<dyn IdentityProvider>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub directory: Arc<RestaurantDirectory>,
    /// Additional observers of status-change events, after store and notifier
    pub extra_sinks: Vec<Box<dyn StatusEventSink>>,
}

pub struct SyncRuntime {
    session: SessionHandle,
    session_task: JoinHandle<()>,
    reconciler: ReconcilerHandle,
    reconciler_task: JoinHandle<()>,
    poller: PollerHandle,
    store: Arc<OrderStateStore>,
    directory: Arc<RestaurantDirectory>,
    shut_down: bool,
}

impl SyncRuntime {
    /// Start all tasks and begin connecting.
    pub async fn start(
        session_config: SessionConfig,
        poller_config: PollerConfig,
        components: SyncComponents,
    ) -> Self {
        let SyncComponents {
            transport,
            source,
            identity,
            dispatcher,
            directory,
            extra_sinks,
        } = components;

        let store = Arc::new(OrderStateStore::new());
        let notifier = StatusNotifier::new(dispatcher, store.clone(), directory.clone());

        // Store first so the notifier sees the applied status
        let sinks: Vec<Box<dyn StatusEventSink>> = vec![Box::new(store.clone()), Box::new(notifier)];
        let mut sink = MultiSink::new(sinks);
        for extra in extra_sinks {
            sink.add(extra);
        }
        let (reconciler, reconciler_task) = ReconcilerService::spawn(sink);

        let (session, session_task) = spawn_session(
            session_config,
            transport,
            identity.clone(),
            reconciler.signal_sender(),
        );

        let poller = ActiveOrderPoller::new(
            poller_config,
            source,
            identity,
            store.clone(),
            reconciler.signal_sender(),
        )
        .spawn();

        if session.connect().await.is_err() {
            debug!("Session stopped before connect");
        }
        info!("Sync runtime started");

        Self {
            session,
            session_task,
            reconciler,
            reconciler_task,
            poller,
            store,
            directory,
            shut_down: false,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn store(&self) -> &Arc<OrderStateStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<RestaurantDirectory> {
        &self.directory
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.session.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Tear everything down. Runs at most once; later calls return immediately.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            debug!("Sync runtime already shut down");
            return;
        }
        self.shut_down = true;
        info!("Shutting down sync runtime");

        self.poller.stop();
        self.session.shutdown().await;
        if let Err(e) = (&mut self.session_task).await {
            debug!(error = %e, "Session task ended abnormally");
        }

        self.reconciler.reset().await;
        self.store.clear().await;
        self.directory.clear();
        self.reconciler_task.abort();

        info!("Sync runtime stopped");
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        if !self.shut_down {
            self.poller.stop();
            self.session_task.abort();
            self.reconciler_task.abort();
        }
    }
}

//! App-lifecycle signals.
//!
//! Hosts report foreground/background transitions on a channel; only the
//! return to the foreground matters to the session.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    BecameActive,
    EnteredBackground,
}

/// Forward lifecycle events to the session until either side goes away.
pub fn forward_lifecycle(
    mut events: mpsc::Receiver<LifecycleEvent>,
    session: SessionHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                LifecycleEvent::BecameActive => {
                    if session.app_became_active().await.is_err() {
                        debug!("Session stopped, lifecycle forwarding ends");
                        return;
                    }
                }
                LifecycleEvent::EnteredBackground => debug!("App entered background"),
            }
        }
    })
}

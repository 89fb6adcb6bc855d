//! Watch command handler.
//!
//! Implements the `watch` subcommand: follows one user's orders over the
//! event stream plus polling and prints every status change until Ctrl-C.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog::RestaurantDirectory;
use crate::cli::WatchCliConfig;
use crate::config::SyncConfig;
use crate::health::{run_health_server, HealthState};
use crate::identity::StaticIdentity;
use crate::notify::{ChannelSink, StatusEventSink, TracingDispatcher};
use crate::orders::{HttpOrderSource, StatusChangeEvent};
use crate::runtime::{SyncComponents, SyncRuntime};
use crate::transport::WebSocketTransport;

const EVENT_BUFFER: usize = 256;

/// Run the `watch` command.
///
/// # Errors
/// Returns error if the configuration is invalid or a collaborator cannot
/// be constructed. Connection problems are retried, not returned.
pub async fn run_watch(cli_config: WatchCliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = cli_config.user_id()?;
    let config = cli_config.apply(SyncConfig::from_env()?)?;

    info!(
        "--- OrderPulse: watching orders of {} via {} ---",
        user_id, config.endpoint
    );

    let transport = Arc::new(WebSocketTransport::new(config.endpoint.clone())?);
    let source = Arc::new(HttpOrderSource::new(
        config.api_base_url.clone(),
        config.api_token.clone(),
    )?);
    let directory = Arc::new(RestaurantDirectory::with_entries(
        cli_config.restaurants.clone(),
    ));

    let (printer, events) = ChannelSink::new(EVENT_BUFFER);
    let printer_task = tokio::spawn(print_events(events));
    let extra_sinks: Vec<Box<dyn StatusEventSink>> = vec![Box::new(printer)];

    let components = SyncComponents {
        transport,
        source,
        identity: Arc::new(StaticIdentity::user(user_id)),
        dispatcher: Arc::new(TracingDispatcher::new()),
        directory,
        extra_sinks,
    };
    let mut runtime = SyncRuntime::start(config.session.clone(), config.poller.clone(), components).await;

    if let Some(port) = config.health_port {
        tokio::spawn(run_health_server(port, HealthState::new(runtime.subscribe_status())));
    }

    let mut status = runtime.subscribe_status();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match &current.connection_error {
                Some(error) => warn!(
                    state = %current.state,
                    attempts = current.reconnect_attempts,
                    error = %error,
                    "Connection status"
                ),
                None => info!(
                    state = %current.state,
                    attempts = current.reconnect_attempts,
                    "Connection status"
                ),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping");

    runtime.shutdown().await;
    status_task.abort();
    printer_task.abort();
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<StatusChangeEvent>) {
    while let Some(event) = events.recv().await {
        let previous = event
            .previous_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} -> {} ({})",
            event.order_id, previous, event.new_status, event.source
        );
    }
}

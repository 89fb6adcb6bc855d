//! Health check HTTP endpoint for monitoring

use crate::metrics;
use crate::session::{ConnectionState, ConnectionStatus};
use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::watch;

#[derive(Debug, Serialize, Clone)]
pub struct HealthResponse {
    pub status: String, // "healthy", "degraded", "critical"
    pub version: String,
    pub connection: ConnectionStatus,
    pub uptime_seconds: u64,
    pub timestamp: i64,
}

impl HealthResponse {
    pub fn from_status(connection: ConnectionStatus, uptime_seconds: u64) -> Self {
        Self {
            status: overall_status(&connection).to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection,
            uptime_seconds,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Stream down with an error is critical; any retry in flight is degraded.
fn overall_status(connection: &ConnectionStatus) -> &'static str {
    match connection.state {
        ConnectionState::Connected => "healthy",
        ConnectionState::Disconnected if connection.connection_error.is_some() => "critical",
        _ => "degraded",
    }
}

#[derive(Clone)]
pub struct HealthState {
    connection: watch::Receiver<ConnectionStatus>,
    started_at: Instant,
}

impl HealthState {
    pub fn new(connection: watch::Receiver<ConnectionStatus>) -> Self {
        Self {
            connection,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> HealthResponse {
        let connection = self.connection.borrow().clone();
        HealthResponse::from_status(connection, self.started_at.elapsed().as_secs())
    }
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<HealthState>,
) -> Json<HealthResponse> {
    Json(state.snapshot())
}

/// Prometheus metrics endpoint
async fn metrics_endpoint() -> String {
    metrics::gather_metrics()
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

pub async fn run_health_server(port: u16, state: HealthState) {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Health check server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Health server failed to bind to {}: {}. Sync will continue without health endpoint.", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Health check server failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_mapping() {
        let connected = ConnectionStatus::derive(ConnectionState::Connected, 0, None, None);
        assert_eq!(HealthResponse::from_status(connected, 1).status, "healthy");

        let retrying = ConnectionStatus::derive(ConnectionState::Reconnecting, 2, None, None);
        assert_eq!(HealthResponse::from_status(retrying, 1).status, "degraded");

        let dead = ConnectionStatus::derive(
            ConnectionState::Disconnected,
            10,
            Some("unable to reconnect".to_string()),
            None,
        );
        assert_eq!(HealthResponse::from_status(dead, 1).status, "critical");
    }

    #[test]
    fn test_snapshot_follows_watch() {
        let (tx, rx) = watch::channel(ConnectionStatus::default());
        let state = HealthState::new(rx);
        assert_eq!(state.snapshot().connection.state, ConnectionState::Disconnected);

        tx.send_replace(ConnectionStatus::derive(ConnectionState::Connected, 0, None, None));
        assert!(state.snapshot().connection.is_connected);
    }
}

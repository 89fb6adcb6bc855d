//! Order resource collaborator.
//!
//! The poller only needs one call: fetch every order of the current user.
//! `HttpOrderSource` implements it against the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::types::OrderSnapshot;
use crate::types::UserId;

/// Default HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the order resource.
#[derive(Debug, Error)]
pub enum OrderSourceError {
    /// Timeout or unreachable host; the poller skips the tick
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Server answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrderSourceError {
    /// True for failures that the next tick is expected to recover from.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientNetwork(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) | Self::Configuration(_) => false,
        }
    }
}

/// Fetches the authenticated user's orders.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_orders_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderSnapshot>, OrderSourceError>;
}

/// REST implementation: `GET {base_url}/users/{user_id}/orders`.
pub struct HttpOrderSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpOrderSource {
    /// Creates a new HTTP order source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, OrderSourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OrderSourceError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn orders_url(&self, user_id: &UserId) -> String {
        format!("{}/users/{}/orders", self.base_url, user_id)
    }
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn fetch_orders_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderSnapshot>, OrderSourceError> {
        let url = self.orders_url(user_id);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                OrderSourceError::TransientNetwork(e.to_string())
            } else {
                OrderSourceError::InvalidResponse(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderSourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let orders: Vec<OrderSnapshot> = response
            .json()
            .await
            .map_err(|e| OrderSourceError::InvalidResponse(e.to_string()))?;
        debug!(user_id = %user_id, count = orders.len(), "Fetched orders");
        Ok(orders)
    }
}

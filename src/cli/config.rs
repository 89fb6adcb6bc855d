//! CLI configuration structs bridging CLI arguments to domain types.
//!
//! Command-line values override whatever was loaded from the environment,
//! one field at a time.

use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigError, SyncConfig};
use crate::resilience::BackoffPolicy;
use crate::types::UserId;

/// Errors from turning CLI arguments into a runnable configuration.
#[derive(Debug, Error)]
pub enum WatchConfigError {
    #[error("User id must not be empty")]
    EmptyUser,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// CLI configuration for the `watch` command.
#[derive(Debug, Clone, Default)]
pub struct WatchCliConfig {
    pub user: String,
    pub endpoint: Option<String>,
    pub api: Option<String>,
    pub token: Option<String>,
    pub poll_interval: Option<u64>,
    pub heartbeat_interval: Option<u64>,
    pub heartbeat_timeout: Option<u64>,
    pub max_attempts: Option<u32>,
    pub health_port: Option<u16>,
    pub restaurants: Vec<(String, String)>,
}

impl WatchCliConfig {
    pub fn user_id(&self) -> Result<UserId, WatchConfigError> {
        let user = self.user.trim();
        if user.is_empty() {
            return Err(WatchConfigError::EmptyUser);
        }
        Ok(UserId::new(user))
    }

    /// Apply overrides on top of `base` and validate the result.
    pub fn apply(&self, mut base: SyncConfig) -> Result<SyncConfig, WatchConfigError> {
        if let Some(endpoint) = &self.endpoint {
            base.endpoint = endpoint.clone();
        }
        if let Some(api) = &self.api {
            base.api_base_url = api.clone();
        }
        if self.token.is_some() {
            base.api_token = self.token.clone();
        }
        if let Some(secs) = self.poll_interval {
            base.poller.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.heartbeat_interval {
            base.session.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.heartbeat_timeout {
            base.session.heartbeat_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_attempts {
            base.session.backoff = BackoffPolicy::new(base.session.backoff.delays().to_vec(), max);
        }
        if self.health_port.is_some() {
            base.health_port = self.health_port;
        }

        base.validate()?;
        Ok(base)
    }
}

/// Parse `ID=NAME`.
pub fn parse_restaurant(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, name)) if !id.trim().is_empty() && !name.trim().is_empty() => {
            Ok((id.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(format!("Expected ID=NAME, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SyncConfig {
        SyncConfig {
            endpoint: "wss://env.example.com".to_string(),
            api_base_url: "https://env.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_overrides_take_precedence() {
        let cli = WatchCliConfig {
            user: "user-1".to_string(),
            endpoint: Some("ws://localhost:8080/ws".to_string()),
            poll_interval: Some(3),
            max_attempts: Some(2),
            ..Default::default()
        };

        let config = cli.apply(base()).unwrap();
        assert_eq!(config.endpoint, "ws://localhost:8080/ws");
        assert_eq!(config.api_base_url, "https://env.example.com");
        assert_eq!(config.poller.interval, Duration::from_secs(3));
        assert_eq!(config.session.backoff.max_attempts(), 2);
        assert_eq!(config.session.backoff.next_delay(1), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let cli = WatchCliConfig {
            user: "user-1".to_string(),
            max_attempts: Some(0),
            ..Default::default()
        };
        assert!(matches!(cli.apply(base()), Err(WatchConfigError::Config(_))));
    }

    #[test]
    fn test_blank_user_rejected() {
        let cli = WatchCliConfig {
            user: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(cli.user_id(), Err(WatchConfigError::EmptyUser)));
    }

    #[test]
    fn test_parse_restaurant() {
        assert_eq!(
            parse_restaurant("resto-1=Luigi's").unwrap(),
            ("resto-1".to_string(), "Luigi's".to_string())
        );
        assert!(parse_restaurant("resto-1").is_err());
        assert!(parse_restaurant("=Name").is_err());
    }
}

//! Runtime configuration.
//!
//! Values come from `ORDERPULSE_*` environment variables (a `.env` file is
//! loaded first by the binary) and can be overridden field by field from
//! the command line.

use std::time::Duration;

use thiserror::Error;

use crate::orders::PollerConfig;
use crate::resilience::BackoffPolicy;
use crate::session::SessionConfig;

pub const ENV_ENDPOINT: &str = "ORDERPULSE_ENDPOINT";
pub const ENV_API_URL: &str = "ORDERPULSE_API_URL";
pub const ENV_API_TOKEN: &str = "ORDERPULSE_API_TOKEN";
pub const ENV_POLL_INTERVAL: &str = "ORDERPULSE_POLL_INTERVAL_SECS";
pub const ENV_HEARTBEAT_INTERVAL: &str = "ORDERPULSE_HEARTBEAT_INTERVAL_SECS";
pub const ENV_HEARTBEAT_TIMEOUT: &str = "ORDERPULSE_HEARTBEAT_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "ORDERPULSE_MAX_RECONNECT_ATTEMPTS";
pub const ENV_BACKOFF_DELAYS: &str = "ORDERPULSE_BACKOFF_DELAYS_SECS";
pub const ENV_HEALTH_PORT: &str = "ORDERPULSE_HEALTH_PORT";

/// Errors from loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a [`crate::runtime::SyncRuntime`] needs.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub session: SessionConfig,
    pub poller: PollerConfig,
    /// Event-stream base URL (`ws://` or `wss://`); the user id is appended
    pub endpoint: String,
    /// Order API base URL
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Serve `/health` and `/metrics` on this port when set
    pub health_port: Option<u16>,
}

impl SyncConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let Some(api) = lookup(ENV_API_URL) {
            config.api_base_url = api;
        }
        config.api_token = lookup(ENV_API_TOKEN).filter(|t| !t.is_empty());

        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            config.poller.interval = parse_secs(ENV_POLL_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HEARTBEAT_INTERVAL) {
            config.session.heartbeat_interval = parse_secs(ENV_HEARTBEAT_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HEARTBEAT_TIMEOUT) {
            config.session.heartbeat_timeout = parse_secs(ENV_HEARTBEAT_TIMEOUT, &raw)?;
        }

        let max_attempts = match lookup(ENV_MAX_ATTEMPTS) {
            Some(raw) => parse_number::<u32>(ENV_MAX_ATTEMPTS, &raw)?,
            None => config.session.backoff.max_attempts(),
        };
        let delays = match lookup(ENV_BACKOFF_DELAYS) {
            Some(raw) => parse_delay_table(&raw)?,
            None => config.session.backoff.delays().to_vec(),
        };
        config.session.backoff = BackoffPolicy::new(delays, max_attempts);

        if let Some(raw) = lookup(ENV_HEALTH_PORT) {
            config.health_port = Some(parse_number::<u16>(ENV_HEALTH_PORT, &raw)?);
        }

        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Missing(ENV_ENDPOINT));
        }
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: ENV_ENDPOINT,
                value: self.endpoint.clone(),
                reason: "must start with ws:// or wss://".to_string(),
            });
        }
        if self.api_base_url.is_empty() {
            return Err(ConfigError::Missing(ENV_API_URL));
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                key: ENV_API_URL,
                value: self.api_base_url.clone(),
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.poller.interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be positive".to_string()));
        }
        if self.session.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if self.session.backoff.max_attempts() == 0 {
            return Err(ConfigError::Invalid(
                "max reconnect attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse_number::<u64>(key, raw).map(Duration::from_secs)
}

/// Comma-separated whole seconds, e.g. `1,2,5,10`.
fn parse_delay_table(raw: &str) -> Result<Vec<Duration>, ConfigError> {
    let delays = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_secs(ENV_BACKOFF_DELAYS, s))
        .collect::<Result<Vec<_>, _>>()?;

    if delays.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: ENV_BACKOFF_DELAYS,
            value: raw.to_string(),
            reason: "delay table must not be empty".to_string(),
        });
    }
    Ok(delays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.poller.interval, Duration::from_secs(15));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.session.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(config.session.backoff.max_attempts(), 10);
        assert_eq!(config.health_port, None);
        assert_eq!(config.validate(), Err(ConfigError::Missing(ENV_ENDPOINT)));
    }

    #[test]
    fn test_full_env() {
        let config = SyncConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "wss://stream.example.com/ws"),
            (ENV_API_URL, "https://api.example.com"),
            (ENV_API_TOKEN, "secret"),
            (ENV_POLL_INTERVAL, "5"),
            (ENV_MAX_ATTEMPTS, "3"),
            (ENV_BACKOFF_DELAYS, "1, 4 ,9"),
            (ENV_HEALTH_PORT, "9090"),
        ]))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.poller.interval, Duration::from_secs(5));
        assert_eq!(config.session.backoff.max_attempts(), 3);
        assert_eq!(config.session.backoff.next_delay(3), Duration::from_secs(9));
        assert_eq!(config.health_port, Some(9090));
    }

    #[test]
    fn test_invalid_number_reports_key() {
        let err = SyncConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL, "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: ENV_POLL_INTERVAL, .. }
        ));
    }

    #[test]
    fn test_empty_delay_table_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[(ENV_BACKOFF_DELAYS, " , ")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: ENV_BACKOFF_DELAYS, .. }
        ));
    }

    #[test]
    fn test_validate_rejects_http_stream_endpoint() {
        let config = SyncConfig {
            endpoint: "http://stream.example.com".to_string(),
            api_base_url: "https://api.example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: ENV_ENDPOINT, .. })
        ));
    }
}

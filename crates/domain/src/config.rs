//! Configuration structures
//!
//! All sections have serde defaults so a config file only needs the
//! endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, TransportError};

/// Top-level transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLinkConfig {
    /// GraphQL-over-HTTP endpoint for queries and mutations
    pub http_endpoint: String,
    /// GraphQL-over-WebSocket endpoint for subscriptions
    pub ws_endpoint: String,
    /// Endpoint receiving the refresh mutation; defaults to `http_endpoint`
    #[serde(default)]
    pub refresh_endpoint: Option<String>,
    /// Route the application navigates to when the session is lost
    #[serde(default = "default_login_route")]
    pub login_route: String,
    /// Per-request timeout on the HTTP path
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
}

fn default_login_route() -> String {
    "/login".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl GraphLinkConfig {
    /// Config with default tuning for the given endpoints
    pub fn new(http_endpoint: impl Into<String>, ws_endpoint: impl Into<String>) -> Self {
        Self {
            http_endpoint: http_endpoint.into(),
            ws_endpoint: ws_endpoint.into(),
            refresh_endpoint: None,
            login_route: default_login_route(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryPolicyConfig::default(),
            auth: AuthConfig::default(),
            subscriptions: SubscriptionConfig::default(),
        }
    }

    /// Endpoint the refresh mutation is posted to
    pub fn refresh_endpoint(&self) -> &str {
        self.refresh_endpoint.as_deref().unwrap_or(&self.http_endpoint)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check endpoints and tuning values
    ///
    /// # Errors
    /// Returns `TransportError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_url(&self.http_endpoint, "http_endpoint", &["http", "https"])?;
        check_url(self.refresh_endpoint(), "refresh_endpoint", &["http", "https"])?;
        check_url(&self.ws_endpoint, "ws_endpoint", &["ws", "wss"])?;

        if self.retry.max_attempts == 0 {
            return Err(TransportError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(TransportError::Config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(TransportError::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

fn check_url(value: &str, field: &str, schemes: &[&str]) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TransportError::Config(format!("{field} must not be empty")));
    }
    let url = Url::parse(value)
        .map_err(|e| TransportError::Config(format!("{field} is not a valid URL: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(TransportError::Config(format!(
            "{field} must use one of {schemes:?}, got '{}'",
            url.scheme()
        )));
    }
    Ok(())
}

/// Retry tuning for transient HTTP failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, jitter included
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 300, max_delay_ms: 10_000, jitter: true }
    }
}

/// Credential lifecycle tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh proactively this many seconds before expiry
    pub refresh_threshold_secs: i64,
    /// Run the background refresh task
    pub auto_refresh: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { refresh_threshold_secs: 300, auto_refresh: false }
    }
}

/// Streaming connection tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Time allowed for the socket handshake plus `connection_ack`
    pub connect_timeout_secs: u64,
    /// Interval between client pings
    pub keepalive_secs: u64,
    /// Reconnect attempts after an unexpected disconnect
    pub reconnect_attempts: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { connect_timeout_secs: 10, keepalive_secs: 30, reconnect_attempts: 5 }
    }
}

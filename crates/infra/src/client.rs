//! Wires configuration into a ready-to-use [`GraphQLClient`]

use std::sync::Arc;
use std::time::Duration;

use graphlink_common::resilience::{BackoffStrategy, Jitter, RetryConfig};
use graphlink_core::{
    CredentialPersistence, GraphQLClient, LogRedirect, MemoryCredentialStore, RefreshCoordinator,
    SessionEvents, SessionRedirect, TokenStore,
};
use graphlink_domain::{GraphLinkConfig, Result, RetryPolicyConfig, TransportError};
use tracing::info;
use url::Url;

use crate::graphql::{GraphQLRefreshClient, HttpTransport, WebSocketConfig, WebSocketTransport};
use crate::http::HttpClient;

/// How often the auto-refresh task re-checks when no expiry is known
const AUTO_REFRESH_IDLE_INTERVAL: Duration = Duration::from_secs(60);

/// Builds a [`GraphQLClient`] over reqwest and tokio-tungstenite.
///
/// Credentials default to memory-only persistence and session loss only
/// logs; embedders plug in a keychain store and their own navigation.
pub struct GraphLinkClientBuilder {
    config: GraphLinkConfig,
    persistence: Arc<dyn CredentialPersistence>,
    redirect: Arc<dyn SessionRedirect>,
}

impl GraphLinkClientBuilder {
    pub fn new(config: GraphLinkConfig) -> Self {
        Self {
            config,
            persistence: Arc::new(MemoryCredentialStore::new()),
            redirect: Arc::new(LogRedirect),
        }
    }

    pub fn persistence(mut self, persistence: Arc<dyn CredentialPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn redirect(mut self, redirect: Arc<dyn SessionRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    /// Validate the configuration, restore persisted credentials and start
    /// the background tasks. Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns `TransportError::Config` for invalid configuration or an
    /// unreadable credential backend
    pub async fn build(self) -> Result<GraphQLClient> {
        let config = self.config;
        config.validate()?;

        let http = HttpClient::builder().timeout(config.request_timeout()).build()?;
        let transport = HttpTransport::new(http.clone(), parse_url(&config.http_endpoint)?);
        let refresh_client = GraphQLRefreshClient::new(http, parse_url(config.refresh_endpoint())?);

        let store = Arc::new(TokenStore::new(self.persistence));
        let restored = store
            .initialize()
            .await
            .map_err(|e| TransportError::Config(format!("failed to restore credentials: {e}")))?;

        let session = SessionEvents::new(self.redirect, config.login_route.clone());
        let coordinator =
            Arc::new(RefreshCoordinator::new(Arc::clone(&store), Arc::new(refresh_client), session));

        let streaming = Arc::new(WebSocketTransport::new(WebSocketConfig::from_config(&config)?, store));
        let client = GraphQLClient::with_transports(
            Arc::clone(&coordinator),
            retry_config(&config.retry),
            transport,
            streaming,
        );

        if config.auth.auto_refresh {
            coordinator.spawn_auto_refresh(config.auth.refresh_threshold_secs, AUTO_REFRESH_IDLE_INTERVAL);
        }

        info!(
            endpoint = %config.http_endpoint,
            ws_endpoint = %config.ws_endpoint,
            restored,
            "GraphQL client ready"
        );
        Ok(client)
    }
}

/// Backoff policy for the HTTP pipeline
pub fn retry_config(policy: &RetryPolicyConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: policy.max_attempts.max(1),
        backoff: BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(policy.initial_delay_ms),
            base: 2.0,
            max_delay: Duration::from_millis(policy.max_delay_ms),
        },
        jitter: if policy.jitter { Jitter::Proportional(0.5) } else { Jitter::None },
    }
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| TransportError::Config(format!("invalid endpoint '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_follows_policy() {
        let retry = retry_config(&RetryPolicyConfig::default());
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_for(0).min(Duration::from_millis(300)), Duration::from_millis(300));
        assert_eq!(retry.jitter, Jitter::Proportional(0.5));
        assert!(retry.validate().is_ok());

        let exact = retry_config(&RetryPolicyConfig { jitter: false, ..Default::default() });
        assert_eq!(exact.delay_for(0), Duration::from_millis(300));
        assert_eq!(exact.delay_for(1), Duration::from_millis(600));
        assert_eq!(exact.delay_for(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = GraphLinkConfig::new("not a url", "ws://localhost/graphql");
        let err = GraphLinkClientBuilder::new(config).build().await.unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_restores_persisted_credentials() {
        let pair = graphlink_domain::CredentialPair::new("saved", Some("refresh".to_string()));
        let config = GraphLinkConfig::new("http://127.0.0.1:9/graphql", "ws://127.0.0.1:9/graphql");

        let client = GraphLinkClientBuilder::new(config)
            .persistence(Arc::new(MemoryCredentialStore::with_pair(pair)))
            .build()
            .await
            .unwrap();

        assert!(client.is_authenticated());
        assert_eq!(client.token_store().access_token().as_deref(), Some("saved"));
    }

    #[tokio::test]
    async fn test_auto_refresh_lives_as_long_as_the_client() {
        let mut config = GraphLinkConfig::new("http://127.0.0.1:9/graphql", "ws://127.0.0.1:9/graphql");
        config.auth.auto_refresh = true;

        let client = GraphLinkClientBuilder::new(config).build().await.unwrap();
        assert!(client.coordinator().is_auto_refreshing());

        let coordinator = Arc::downgrade(client.coordinator());
        drop(client);
        assert!(coordinator.upgrade().is_none(), "auto-refresh must not keep the coordinator alive");
    }
}

//! Port interfaces for the transport's external collaborators
//!
//! Infrastructure implements these traits; core logic only ever talks to
//! them through `Arc<dyn ...>` or generic parameters so every collaborator
//! can be replaced with a test double.

use std::sync::Arc;

use async_trait::async_trait;
use graphlink_domain::{
    CredentialPair, GraphQLRequest, GraphQLResponse, RefreshResponse, Result, TransportError,
};
use tokio::sync::mpsc;

use crate::auth::CredentialStoreError;
use crate::pipeline::OperationRequest;

/// Persistence medium behind the credential store.
///
/// Memory-only, OS keychain or browser-style storage all fit; the store
/// only needs load/save/remove.
#[async_trait]
pub trait CredentialPersistence: Send + Sync {
    /// Load the persisted pair, `None` when nothing is stored
    async fn load(&self) -> std::result::Result<Option<CredentialPair>, CredentialStoreError>;

    /// Persist the pair, replacing any previous one
    async fn save(&self, pair: &CredentialPair) -> std::result::Result<(), CredentialStoreError>;

    /// Remove the persisted pair; removing nothing is not an error
    async fn remove(&self) -> std::result::Result<(), CredentialStoreError>;
}

/// One stage of the request/response pipeline.
///
/// Stages wrap the next stage; the innermost implementation performs the
/// actual HTTP exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Execute a query or mutation.
    ///
    /// GraphQL application errors come back inside `Ok(response)`;
    /// `Err` is reserved for transport, status and authentication failures.
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse>;
}

#[async_trait]
impl<T: Exchange + ?Sized> Exchange for Arc<T> {
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
        (**self).execute(request).await
    }
}

/// Client for the credential refresh endpoint
#[async_trait]
pub trait RefreshClient: Send + Sync {
    /// Exchange a refresh credential for a new access credential.
    ///
    /// Both `Err` and a `success: false` payload count as a failed refresh.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse>;
}

/// Event pushed by a streaming transport for one subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Next(GraphQLResponse),
    Error(TransportError),
    Complete,
}

/// Channel a streaming transport pushes events into
pub type EventSink = mpsc::UnboundedSender<StreamEvent>;

/// Owns one live network subscription
pub trait SubscriptionGuard: Send {
    /// Tear the network subscription down. Must be safe to call after the
    /// server already completed it.
    fn unsubscribe(self: Box<Self>);
}

/// Persistent streaming transport (GraphQL over WebSocket)
pub trait StreamingTransport: Send + Sync {
    /// Start exactly one network subscription for `request`, delivering its
    /// events into `sink` until a terminal event or until the returned guard
    /// is released.
    fn subscribe(&self, request: GraphQLRequest, sink: EventSink) -> Box<dyn SubscriptionGuard>;
}

/// Navigation hook fired when the session cannot be recovered
pub trait SessionRedirect: Send + Sync {
    /// Navigate to the unauthenticated entry point
    fn redirect(&self, route: &str);
}

/// Redirect that only logs; for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirect;

impl SessionRedirect for LogRedirect {
    fn redirect(&self, route: &str) {
        tracing::warn!(route, "session lost, redirecting to unauthenticated entry point");
    }
}

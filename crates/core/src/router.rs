//! Transport router
//!
//! The one entry point callers use. Queries and mutations go through the
//! HTTP pipeline; subscriptions go to the streaming transport. The split is
//! keyed only on [`OperationKind`], never on payload content.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use graphlink_common::resilience::RetryConfig;
use graphlink_domain::{
    CredentialPair, GraphQLRequest, GraphQLResponse, Operation, OperationKind, Result,
    TransportError,
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::auth::{RefreshCoordinator, SessionEvent, TokenStore};
use crate::pipeline::{http_pipeline, OperationRequest};
use crate::ports::{Exchange, StreamingTransport};
use crate::subscription::{Subscription, SubscriptionSource};

/// Wire path an operation travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Request/response through the HTTP pipeline
    Http,
    /// Persistent streaming transport
    Streaming,
}

impl Route {
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Query | OperationKind::Mutation => Self::Http,
            OperationKind::Subscription => Self::Streaming,
        }
    }
}

/// GraphQL client routing operations to the matching transport
#[derive(Clone)]
pub struct GraphQLClient {
    http: Arc<dyn Exchange>,
    streaming: Arc<dyn StreamingTransport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl GraphQLClient {
    /// Client over an already composed HTTP chain
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        http: Arc<dyn Exchange>,
        streaming: Arc<dyn StreamingTransport>,
    ) -> Self {
        Self { http, streaming, coordinator }
    }

    /// Client over a raw HTTP transport, composing the standard chain
    /// (auth → refresh → retry → transport) around it
    pub fn with_transports<T: Exchange + 'static>(
        coordinator: Arc<RefreshCoordinator>,
        retry: RetryConfig,
        http_transport: T,
        streaming: Arc<dyn StreamingTransport>,
    ) -> Self {
        let pipeline = http_pipeline(Arc::clone(&coordinator), retry, http_transport);
        Self::new(coordinator, Arc::new(pipeline), streaming)
    }

    /// Where `operation` will be sent
    pub fn route(operation: &Operation) -> Route {
        Route::for_kind(operation.kind)
    }

    /// Submit any operation and receive its results as a stream.
    ///
    /// Queries and mutations yield exactly one item; subscriptions yield
    /// until completion, a terminal error, or until the stream is dropped.
    /// Nothing is sent until the stream is first polled.
    pub fn request(&self, operation: Operation) -> BoxStream<'static, Result<GraphQLResponse>> {
        match Self::route(&operation) {
            Route::Streaming => {
                let streaming = Arc::clone(&self.streaming);
                stream::once(async move {
                    debug!(operation = %operation.display_name(), "dispatching over streaming transport");
                    Subscription::open(streaming.as_ref(), operation.request)
                })
                .flatten()
                .boxed()
            }
            Route::Http => {
                let http = Arc::clone(&self.http);
                stream::once(async move { http.execute(OperationRequest::new(operation)).await })
                    .boxed()
            }
        }
    }

    /// Execute a query or mutation over HTTP.
    ///
    /// GraphQL application errors are returned inside the response.
    ///
    /// # Errors
    /// Returns `TransportError::Client` for subscription operations, or the
    /// terminal transport/authentication failure
    #[instrument(skip_all, fields(operation = %operation.display_name(), kind = %operation.kind))]
    pub async fn execute(&self, operation: Operation) -> Result<GraphQLResponse> {
        if Self::route(&operation) == Route::Streaming {
            return Err(TransportError::Client(
                "subscriptions must be started with subscribe()".to_string(),
            ));
        }
        debug!("dispatching over HTTP");
        self.http.execute(OperationRequest::new(operation)).await
    }

    /// # Errors
    /// See [`execute`](Self::execute)
    pub async fn query(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        self.execute(Operation::query(request)).await
    }

    /// # Errors
    /// See [`execute`](Self::execute)
    pub async fn mutate(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        self.execute(Operation::mutation(request)).await
    }

    /// Run a query and decode its `data` into `T`.
    ///
    /// # Errors
    /// Returns `TransportError::GraphQL` when the response carries errors,
    /// `TransportError::Client` when `data` is missing or does not decode
    pub async fn query_as<T: DeserializeOwned>(&self, request: GraphQLRequest) -> Result<T> {
        let response = self.query(request).await?;
        if response.has_errors() {
            return Err(TransportError::GraphQL(response.errors));
        }
        let data = response
            .data
            .ok_or_else(|| TransportError::Client("response contained no data".to_string()))?;
        serde_json::from_value(data)
            .map_err(|e| TransportError::Client(format!("failed to decode response data: {e}")))
    }

    /// Start a subscription on the streaming transport
    pub fn subscribe(&self, request: GraphQLRequest) -> Subscription {
        debug!(operation = ?request.operation_name, "dispatching over streaming transport");
        Subscription::open(self.streaming.as_ref(), request)
    }

    /// Cold subscription: nothing is sent until it is subscribed
    pub fn watch(&self, request: GraphQLRequest) -> SubscriptionSource {
        SubscriptionSource::new(Arc::clone(&self.streaming), request)
    }

    /// Store credentials obtained by the application's login flow
    ///
    /// # Errors
    /// Returns `TransportError::Config` if the credentials cannot be persisted
    pub async fn login(&self, pair: CredentialPair) -> Result<()> {
        self.coordinator.login(pair).await
    }

    /// Clear credentials and notify session listeners
    ///
    /// # Errors
    /// Returns `TransportError::Config` if persisted credentials cannot be removed
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.logout().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.coordinator.store().is_authenticated()
    }

    pub fn token_store(&self) -> Arc<TokenStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.session_events()
    }
}

impl fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQLClient").field("coordinator", &self.coordinator).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use graphlink_domain::RefreshResponse;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::auth::{MemoryCredentialStore, SessionEvents};
    use crate::ports::{EventSink, LogRedirect, RefreshClient, StreamEvent, SubscriptionGuard};

    struct EchoHttp(AtomicU32);

    #[async_trait]
    impl Exchange for EchoHttp {
        async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(GraphQLResponse::from_data(json!({ "viewer": { "name": request.operation.request.query } })))
        }
    }

    #[derive(Default)]
    struct StreamRecorder {
        sinks: Mutex<Vec<EventSink>>,
    }

    struct NoopGuard;

    impl SubscriptionGuard for NoopGuard {
        fn unsubscribe(self: Box<Self>) {}
    }

    impl StreamingTransport for StreamRecorder {
        fn subscribe(&self, _request: GraphQLRequest, sink: EventSink) -> Box<dyn SubscriptionGuard> {
            self.sinks.lock().push(sink);
            Box::new(NoopGuard)
        }
    }

    struct NoRefresh;

    #[async_trait]
    impl RefreshClient for NoRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse> {
            Ok(RefreshResponse::default())
        }
    }

    fn client() -> (GraphQLClient, Arc<EchoHttp>, Arc<StreamRecorder>) {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryCredentialStore::new())));
        let session = SessionEvents::new(Arc::new(LogRedirect), "/login");
        let coordinator = Arc::new(RefreshCoordinator::new(store, Arc::new(NoRefresh), session));
        let http = Arc::new(EchoHttp(AtomicU32::new(0)));
        let streaming = Arc::new(StreamRecorder::default());
        let client = GraphQLClient::new(coordinator, http.clone(), streaming.clone());
        (client, http, streaming)
    }

    #[test]
    fn test_route_is_keyed_on_kind_only() {
        assert_eq!(Route::for_kind(OperationKind::Query), Route::Http);
        assert_eq!(Route::for_kind(OperationKind::Mutation), Route::Http);
        assert_eq!(Route::for_kind(OperationKind::Subscription), Route::Streaming);

        // A query whose text mentions subscriptions still goes over HTTP
        let op = Operation::query(GraphQLRequest::new("{ subscription { id } }"));
        assert_eq!(GraphQLClient::route(&op), Route::Http);
    }

    #[tokio::test]
    async fn test_queries_use_http_and_subscriptions_use_streaming() {
        let (client, http, streaming) = client();

        client.query(GraphQLRequest::new("{ viewer { name } }")).await.unwrap();
        let _subscription = client.subscribe(GraphQLRequest::new("subscription { tick }"));

        assert_eq!(http.0.load(Ordering::SeqCst), 1);
        assert_eq!(streaming.sinks.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_rejects_subscriptions() {
        let (client, http, _) = client();
        let err = client
            .execute(Operation::subscription(GraphQLRequest::new("subscription { tick }")))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Client(_)));
        assert_eq!(http.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_stream_is_uniform() {
        let (client, http, streaming) = client();

        let mut query = client.request(Operation::query(GraphQLRequest::new("{ a }")));
        assert_eq!(http.0.load(Ordering::SeqCst), 0, "sent before the stream was polled");
        assert!(query.next().await.unwrap().is_ok());
        assert!(query.next().await.is_none());

        let mut updates =
            client.request(Operation::subscription(GraphQLRequest::new("subscription { b }")));
        assert!(streaming.sinks.lock().is_empty(), "subscribed before the stream was polled");
        assert!(futures::poll!(updates.next()).is_pending());
        let sink = streaming.sinks.lock()[0].clone();
        sink.send(StreamEvent::Next(GraphQLResponse::from_data(json!({ "b": 1 })))).unwrap();
        sink.send(StreamEvent::Complete).unwrap();
        assert!(updates.next().await.unwrap().is_ok());
        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn test_query_as_decodes_data() {
        #[derive(Debug, Deserialize)]
        struct Viewer {
            viewer: Name,
        }

        #[derive(Debug, Deserialize)]
        struct Name {
            name: String,
        }

        let (client, _, _) = client();
        let decoded: Viewer = client.query_as(GraphQLRequest::new("{ viewer { name } }")).await.unwrap();
        assert_eq!(decoded.viewer.name, "{ viewer { name } }");
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_notifies() {
        let (client, _, _) = client();
        client.login(CredentialPair::new("abc", Some("def".into()))).await.unwrap();
        assert!(client.is_authenticated());

        let mut events = client.session_events();
        client.logout().await.unwrap();
        assert!(!client.is_authenticated());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    }
}

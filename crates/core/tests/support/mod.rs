//! Test doubles shared by the core integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphlink_common::resilience::RetryConfig;
use graphlink_core::{
    EventSink, Exchange, GraphQLClient, MemoryCredentialStore, OperationRequest, RefreshClient,
    RefreshCoordinator, SessionEvents, SessionRedirect, StreamingTransport, SubscriptionGuard,
    TokenStore,
};
use graphlink_domain::{
    CredentialPair, GraphQLError, GraphQLRequest, GraphQLResponse, RefreshResponse, Result,
    TransportError, UNAUTHENTICATED_CODE,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

/// How the HTTP double signals a rejected credential
#[derive(Debug, Clone, Copy)]
pub enum Rejection {
    /// HTTP 401
    Status,
    /// 200 with an UNAUTHENTICATED GraphQL error
    GraphQLCode,
}

/// HTTP transport double accepting exactly one access credential.
///
/// Scripted transient failures are returned first, in order.
pub struct GatedHttp {
    accepted: Mutex<String>,
    rejection: Rejection,
    transient: Mutex<VecDeque<TransportError>>,
    pub bearers: Mutex<Vec<Option<String>>>,
    pub sent_at: Mutex<Vec<Instant>>,
    latency: Duration,
}

impl GatedHttp {
    pub fn new(accepted: &str, rejection: Rejection) -> Self {
        Self {
            accepted: Mutex::new(accepted.to_string()),
            rejection,
            transient: Mutex::new(VecDeque::new()),
            bearers: Mutex::new(Vec::new()),
            sent_at: Mutex::new(Vec::new()),
            latency: Duration::from_millis(10),
        }
    }

    pub fn with_transient_failures(self, failures: Vec<TransportError>) -> Self {
        *self.transient.lock() = failures.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.bearers.lock().len()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().clone()
    }

    /// Gaps between consecutive sends
    pub fn gaps(&self) -> Vec<Duration> {
        self.sent_at.lock().windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

#[async_trait]
impl Exchange for GatedHttp {
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
        self.bearers.lock().push(request.bearer().map(str::to_owned));
        self.sent_at.lock().push(Instant::now());
        tokio::time::sleep(self.latency).await;

        if let Some(error) = self.transient.lock().pop_front() {
            return Err(error);
        }

        if request.bearer() != Some(self.accepted.lock().as_str()) {
            return match self.rejection {
                Rejection::Status => Err(TransportError::from_status(401, "token expired")),
                Rejection::GraphQLCode => Ok(GraphQLResponse::from_errors(vec![
                    GraphQLError::with_code("not authenticated", UNAUTHENTICATED_CODE),
                ])),
            };
        }

        Ok(GraphQLResponse::from_data(json!({ "query": request.operation.request.query })))
    }
}

/// What the refresh endpoint double answers
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    Grant(&'static str),
    Deny(&'static str),
    NetworkError,
}

pub struct CountingRefresh {
    pub calls: AtomicU32,
    behavior: RefreshBehavior,
    latency: Duration,
}

impl CountingRefresh {
    pub fn new(behavior: RefreshBehavior) -> Self {
        Self { calls: AtomicU32::new(0), behavior, latency: Duration::from_millis(200) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshClient for CountingRefresh {
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        match &self.behavior {
            RefreshBehavior::Grant(token) => Ok(RefreshResponse {
                success: true,
                access_token: Some((*token).to_string()),
                expires_in: Some(900),
                ..Default::default()
            }),
            RefreshBehavior::Deny(reason) => Ok(RefreshResponse {
                success: false,
                errors: vec![GraphQLError::new(*reason)],
                ..Default::default()
            }),
            RefreshBehavior::NetworkError => {
                Err(TransportError::Network("refresh endpoint unreachable".into()))
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingRedirect {
    pub routes: Mutex<Vec<String>>,
}

impl SessionRedirect for RecordingRedirect {
    fn redirect(&self, route: &str) {
        self.routes.lock().push(route.to_string());
    }
}

/// Streaming double: the test pushes events through the recorded sinks
#[derive(Default)]
pub struct ManualStreaming {
    pub opened: Mutex<Vec<(GraphQLRequest, EventSink)>>,
    pub released: Arc<AtomicU32>,
}

struct ReleaseCounter(Arc<AtomicU32>);

impl SubscriptionGuard for ReleaseCounter {
    fn unsubscribe(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl StreamingTransport for ManualStreaming {
    fn subscribe(&self, request: GraphQLRequest, sink: EventSink) -> Box<dyn SubscriptionGuard> {
        self.opened.lock().push((request, sink));
        Box::new(ReleaseCounter(Arc::clone(&self.released)))
    }
}

impl ManualStreaming {
    pub fn sink(&self, index: usize) -> EventSink {
        self.opened.lock()[index].1.clone()
    }

    pub fn released(&self) -> u32 {
        self.released.load(Ordering::SeqCst)
    }
}

/// A fully wired client over the doubles
pub struct Harness {
    pub client: GraphQLClient,
    pub http: Arc<GatedHttp>,
    pub refresh: Arc<CountingRefresh>,
    pub redirect: Arc<RecordingRedirect>,
    pub streaming: Arc<ManualStreaming>,
}

impl Harness {
    pub async fn new(http: GatedHttp, refresh: RefreshBehavior) -> Self {
        Self::with_retry(http, refresh, RetryConfig::default()).await
    }

    pub async fn with_retry(http: GatedHttp, refresh: RefreshBehavior, retry: RetryConfig) -> Self {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryCredentialStore::new())));
        let redirect = Arc::new(RecordingRedirect::default());
        let refresh = Arc::new(CountingRefresh::new(refresh));
        let session = SessionEvents::new(redirect.clone(), "/login");
        let coordinator = Arc::new(RefreshCoordinator::new(store, refresh.clone(), session));

        let http = Arc::new(http);
        let streaming = Arc::new(ManualStreaming::default());
        let client =
            GraphQLClient::with_transports(coordinator, retry, Arc::clone(&http), streaming.clone());

        client
            .login(CredentialPair::new("old-token", Some("refresh-token".to_string())))
            .await
            .expect("login should store credentials");

        Self { client, http, refresh, redirect, streaming }
    }
}

pub fn query(text: &str) -> GraphQLRequest {
    GraphQLRequest::new(text)
}

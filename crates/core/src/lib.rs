//! # GraphLink Core
//!
//! Transport logic with no network code of its own.
//!
//! This crate contains:
//! - Port interfaces (traits) for persistence, HTTP exchange, refresh,
//!   streaming and navigation
//! - The credential store, auth middleware and single-flight refresh
//!   coordinator
//! - The statically composed HTTP pipeline (auth → refresh → retry →
//!   transport)
//! - The transport router and subscription adapter
//!
//! ## Architecture Principles
//! - Only depends on `graphlink-common` and `graphlink-domain`
//! - No HTTP, WebSocket or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod pipeline;
pub mod ports;
pub mod retry;
pub mod router;
pub mod subscription;

pub use auth::{
    AuthMiddleware, AuthStage, CredentialStoreError, MemoryCredentialStore, RefreshCoordinator,
    RefreshStage, SessionEvent, SessionEvents, TokenStore,
};
pub use pipeline::{http_pipeline, HttpPipeline, OperationRequest};
pub use ports::{
    CredentialPersistence, EventSink, Exchange, LogRedirect, RefreshClient, SessionRedirect,
    StreamEvent, StreamingTransport, SubscriptionGuard,
};
pub use retry::{RetryStage, TransientErrorPolicy};
pub use router::{GraphQLClient, Route};
pub use subscription::{Subscription, SubscriptionSource};

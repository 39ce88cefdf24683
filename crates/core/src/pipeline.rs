//! Request/response pipeline
//!
//! The HTTP path is an ordered, statically composed chain of stages:
//!
//! ```text
//! AuthStage ──► RefreshStage ──► RetryStage ──► transport (HTTP)
//!  attach        auth failure      transient
//!  bearer        → single-flight   failure →
//!                refresh + replay  backoff
//! ```
//!
//! Each stage owns the next one by value, so the whole chain is a single
//! concrete type with no dynamic dispatch between stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use graphlink_common::resilience::RetryConfig;
use graphlink_domain::{Operation, OperationKind};

use crate::auth::{AuthMiddleware, AuthStage, RefreshCoordinator, RefreshStage};
use crate::ports::Exchange;
use crate::retry::RetryStage;

/// Header carrying the bearer credential
pub const AUTHORIZATION_HEADER: &str = "authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// An operation in flight on the HTTP path together with its headers
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub operation: Operation,
    pub headers: BTreeMap<String, String>,
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self { operation, headers: BTreeMap::new() }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    /// Attach `token` as the bearer credential, replacing any previous one
    pub fn set_bearer(&mut self, token: &str) {
        self.headers.insert(AUTHORIZATION_HEADER.to_string(), format!("{BEARER_PREFIX}{token}"));
    }

    /// The bearer credential this request carries, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION_HEADER)?.strip_prefix(BEARER_PREFIX)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}

/// Full HTTP chain over terminal transport `T`
pub type HttpPipeline<T> = AuthStage<RefreshStage<RetryStage<T>>>;

/// Compose the HTTP chain in its fixed order
pub fn http_pipeline<T: Exchange>(
    coordinator: Arc<RefreshCoordinator>,
    retry: RetryConfig,
    transport: T,
) -> HttpPipeline<T> {
    let middleware = AuthMiddleware::new(coordinator.store());
    let retry_stage = RetryStage::new(retry, transport);
    let refresh_stage = RefreshStage::new(coordinator, middleware.clone(), retry_stage);
    AuthStage::new(middleware, refresh_stage)
}

#[cfg(test)]
mod tests {
    use graphlink_domain::GraphQLRequest;

    use super::*;

    #[test]
    fn test_bearer_round_trip() {
        let mut request = OperationRequest::new(Operation::query(GraphQLRequest::new("{ me }")));
        assert_eq!(request.bearer(), None);

        request.set_bearer("first");
        request.set_bearer("second");
        assert_eq!(request.bearer(), Some("second"));
        assert_eq!(request.headers.get("authorization").map(String::as_str), Some("Bearer second"));
    }

    #[test]
    fn test_non_bearer_authorization_is_ignored() {
        let request = OperationRequest::new(Operation::query(GraphQLRequest::new("{ me }")))
            .with_header("Authorization", "Basic abc");
        assert_eq!(request.bearer(), None);
    }
}

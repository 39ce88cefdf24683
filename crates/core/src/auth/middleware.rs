//! Bearer credential attachment

use std::sync::Arc;

use async_trait::async_trait;
use graphlink_domain::{GraphQLResponse, Result};

use super::token_store::TokenStore;
use crate::pipeline::OperationRequest;
use crate::ports::Exchange;

/// Attaches the current access credential to outgoing requests.
///
/// Pure and synchronous: reads the store, never fails. Requests made while
/// unauthenticated go out unmodified.
#[derive(Debug, Clone)]
pub struct AuthMiddleware {
    store: Arc<TokenStore>,
}

impl AuthMiddleware {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    pub fn apply(&self, request: &mut OperationRequest) {
        if let Some(token) = self.store.access_token() {
            request.set_bearer(&token);
        }
    }
}

/// Pipeline stage running [`AuthMiddleware`] before the next stage
pub struct AuthStage<N> {
    middleware: AuthMiddleware,
    next: N,
}

impl<N> AuthStage<N> {
    pub fn new(middleware: AuthMiddleware, next: N) -> Self {
        Self { middleware, next }
    }
}

#[async_trait]
impl<N: Exchange> Exchange for AuthStage<N> {
    async fn execute(&self, mut request: OperationRequest) -> Result<GraphQLResponse> {
        self.middleware.apply(&mut request);
        self.next.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use graphlink_domain::{CredentialPair, GraphQLRequest, Operation};

    use super::*;
    use crate::auth::MemoryCredentialStore;

    fn request() -> OperationRequest {
        OperationRequest::new(Operation::query(GraphQLRequest::new("{ me { id } }")))
    }

    #[tokio::test]
    async fn test_attaches_current_token() {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryCredentialStore::new())));
        store.set(CredentialPair::new("abc", None)).await.unwrap();

        let mut req = request();
        AuthMiddleware::new(store).apply(&mut req);
        assert_eq!(req.bearer(), Some("abc"));
    }

    #[test]
    fn test_unauthenticated_request_is_untouched() {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryCredentialStore::new())));

        let original = request();
        let mut req = original.clone();
        AuthMiddleware::new(store).apply(&mut req);
        assert_eq!(req, original);
        assert!(req.headers.is_empty());
    }
}

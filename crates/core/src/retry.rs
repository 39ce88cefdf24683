//! Transient-failure retry stage
//!
//! Sits innermost in the HTTP chain, directly above the transport, so every
//! retry is a plain re-send of the same request. Authentication failures are
//! never retried here; they surface immediately to the refresh stage.

use async_trait::async_trait;
use graphlink_common::resilience::{RetryConfig, RetryDecision, RetryExecutor, RetryPolicy};
use graphlink_domain::{GraphQLResponse, Result, TransportError};
use tracing::debug;

use crate::pipeline::OperationRequest;
use crate::ports::Exchange;

/// Retries transport failures in the network category only
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrorPolicy;

impl RetryPolicy<TransportError> for TransientErrorPolicy {
    fn should_retry(&self, error: &TransportError, _attempt: u32) -> RetryDecision {
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Pipeline stage re-issuing transient failures with backoff
#[derive(Debug)]
pub struct RetryStage<N> {
    executor: RetryExecutor<TransientErrorPolicy>,
    next: N,
}

impl<N> RetryStage<N> {
    pub fn new(config: RetryConfig, next: N) -> Self {
        Self { executor: RetryExecutor::new(config, TransientErrorPolicy), next }
    }

    pub fn config(&self) -> &RetryConfig {
        self.executor.config()
    }
}

#[async_trait]
impl<N: Exchange> Exchange for RetryStage<N> {
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
        let request = &request;
        let outcome = self.executor.execute_with_outcome(|| self.next.execute(request.clone())).await;

        if outcome.attempts > 1 {
            debug!(
                operation = %request.operation.display_name(),
                attempts = outcome.attempts,
                waited_ms = outcome.total_delay().as_millis() as u64,
                "operation needed retries"
            );
        }

        outcome.result.map_err(|e| {
            e.into_source()
                .unwrap_or_else(|| TransportError::Config("invalid retry configuration".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use graphlink_domain::{GraphQLError, GraphQLRequest, Operation, UNAUTHENTICATED_CODE};
    use parking_lot::Mutex;

    use super::*;

    /// Fails with the scripted errors, then succeeds
    struct Scripted {
        failures: Mutex<Vec<TransportError>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut failures: Vec<TransportError>) -> Self {
            failures.reverse();
            Self { failures: Mutex::new(failures), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl Exchange for Scripted {
        async fn execute(&self, _request: OperationRequest) -> Result<GraphQLResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().pop() {
                Some(error) => Err(error),
                None => Ok(GraphQLResponse::from_data(serde_json::json!({"ok": true}))),
            }
        }
    }

    fn request() -> OperationRequest {
        OperationRequest::new(Operation::query(GraphQLRequest::new("{ ping }")))
    }

    fn network(msg: &str) -> TransportError {
        TransportError::Network(msg.to_string())
    }

    #[test]
    fn test_policy_classification() {
        let policy = TransientErrorPolicy;
        assert_eq!(policy.should_retry(&network("reset"), 0), RetryDecision::Retry);
        assert_eq!(
            policy.should_retry(&TransportError::Timeout(Duration::from_secs(30)), 0),
            RetryDecision::Retry
        );
        assert_eq!(
            policy.should_retry(&TransportError::Auth("401".into()), 0),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.should_retry(&TransportError::Client("bad request".into()), 0),
            RetryDecision::Stop
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failure() {
        let stage = RetryStage::new(RetryConfig::default(), Scripted::new(vec![network("reset")]));
        let response = stage.execute(request()).await.unwrap();

        assert!(!response.has_errors());
        assert_eq!(stage.next.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_network_error() {
        let stage = RetryStage::new(
            RetryConfig::default(),
            Scripted::new(vec![network("one"), network("two"), network("three")]),
        );
        let err = stage.execute(request()).await.unwrap_err();

        assert_eq!(err, network("three"));
        assert_eq!(stage.next.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_never_reissued() {
        let stage = RetryStage::new(
            RetryConfig::default(),
            Scripted::new(vec![TransportError::Auth("expired".into())]),
        );
        let err = stage.execute(request()).await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(stage.next.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_graphql_error_passes_through() {
        struct Unauthenticated(AtomicU32);

        #[async_trait]
        impl Exchange for Unauthenticated {
            async fn execute(&self, _request: OperationRequest) -> Result<GraphQLResponse> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(GraphQLResponse::from_errors(vec![GraphQLError::with_code(
                    "not logged in",
                    UNAUTHENTICATED_CODE,
                )]))
            }
        }

        let stage = RetryStage::new(RetryConfig::default(), Unauthenticated(AtomicU32::new(0)));
        let response = stage.execute(request()).await.unwrap();

        assert!(response.is_unauthenticated());
        assert_eq!(stage.next.0.load(Ordering::SeqCst), 1);
    }
}

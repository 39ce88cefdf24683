//! GraphQL over HTTP
//!
//! The terminal stage of the HTTP pipeline: POSTs
//! `{query, variables, operationName}` as JSON with whatever headers the
//! earlier stages attached, and classifies the outcome.

use async_trait::async_trait;
use graphlink_core::{Exchange, OperationRequest};
use graphlink_domain::{GraphQLResponse, Result, TransportError};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Response};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::IntoTransportError;
use crate::http::HttpClient;

/// Longest slice of an error body carried into error messages
const ERROR_BODY_LIMIT: usize = 256;

/// Request/response transport for queries and mutations
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(client: HttpClient, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Exchange for HttpTransport {
    #[instrument(skip_all, fields(operation = %request.operation.display_name(), id = %request.operation.id))]
    async fn execute(&self, request: OperationRequest) -> Result<GraphQLResponse> {
        let mut builder = self
            .client
            .request(Method::POST, self.endpoint.clone())
            .json(&request.operation.request);

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Client(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Client(format!("invalid value for header {name}: {e}")))?;
            builder = builder.header(name, value);
        }

        let response = self.client.send(builder).await?;
        read_graphql_response(response).await
    }
}

/// Classify an HTTP response carrying a GraphQL payload.
///
/// Non-success statuses become errors (401/403 authentication, 429/5xx
/// transient, other 4xx client); success bodies must decode as a GraphQL
/// response, whose `errors` are passed through untouched.
pub(crate) async fn read_graphql_response(response: Response) -> Result<GraphQLResponse> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        warn!(status = status.as_u16(), "GraphQL endpoint returned an error status");
        let message = if snippet.is_empty() {
            status.canonical_reason().unwrap_or("unknown status").to_string()
        } else {
            snippet
        };
        return Err(TransportError::from_status(status.as_u16(), message));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TransportError::Network(format!("failed to read response body: {e}")))?;
    let parsed: GraphQLResponse =
        serde_json::from_slice(&bytes).map_err(IntoTransportError::into_transport)?;

    if parsed.has_errors() {
        debug!(errors = parsed.errors.len(), "GraphQL response carried errors");
    }
    Ok(parsed)
}

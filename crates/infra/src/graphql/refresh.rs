//! Refresh endpoint client

use async_trait::async_trait;
use graphlink_core::RefreshClient;
use graphlink_domain::{GraphQLRequest, RefreshResponse, Result, TransportError};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use super::transport::read_graphql_response;
use crate::http::HttpClient;

const REFRESH_MUTATION: &str = "mutation RefreshToken($refreshToken: String!) { \
    refreshToken(input: { refreshToken: $refreshToken }) { \
    success accessToken expiresIn errors { message } } }";

/// Exchanges the refresh credential for a new access credential via the
/// `refreshToken` mutation.
///
/// The request is sent without an `Authorization` header; the refresh
/// credential in the variables is the only proof of identity.
#[derive(Debug, Clone)]
pub struct GraphQLRefreshClient {
    client: HttpClient,
    endpoint: Url,
}

impl GraphQLRefreshClient {
    pub fn new(client: HttpClient, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl RefreshClient for GraphQLRefreshClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let body = GraphQLRequest::new(REFRESH_MUTATION)
            .with_variables(json!({ "refreshToken": refresh_token }))
            .with_operation_name("RefreshToken");

        let builder = self.client.request(Method::POST, self.endpoint.clone()).json(&body);
        let response = read_graphql_response(self.client.send(builder).await?).await?;

        if response.has_errors() {
            debug!(errors = response.errors.len(), "refresh mutation returned GraphQL errors");
            return Ok(RefreshResponse { success: false, errors: response.errors, ..Default::default() });
        }

        let payload = response
            .data
            .and_then(|mut data| data.get_mut("refreshToken").map(serde_json::Value::take))
            .filter(|payload| !payload.is_null())
            .ok_or_else(|| TransportError::Protocol("refresh response has no refreshToken field".into()))?;

        serde_json::from_value(payload)
            .map_err(|e| TransportError::Protocol(format!("malformed refresh payload: {e}")))
    }
}

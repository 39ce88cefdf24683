//! GraphQL request and response payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension code the backend uses for authentication failures
pub const UNAUTHENTICATED_CODE: &str = "UNAUTHENTICATED";

/// GraphQL request body: `{query, variables, operationName}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    /// Request for a document without variables
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), variables: None, operation_name: None }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// A single entry of a GraphQL `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    /// Error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), path: None, locations: None, extensions: None }
    }

    /// Error carrying an `extensions.code`
    pub fn with_code(message: impl Into<String>, code: &str) -> Self {
        let mut extensions = Map::new();
        extensions.insert("code".to_string(), Value::String(code.to_string()));
        Self { extensions: Some(extensions), ..Self::new(message) }
    }

    /// The `extensions.code` value, if present
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }

    /// True when this error signals missing or expired authentication
    pub fn is_unauthenticated(&self) -> bool {
        self.code().is_some_and(|code| code.eq_ignore_ascii_case(UNAUTHENTICATED_CODE))
    }
}

/// GraphQL response envelope.
///
/// Application errors travel in `errors` next to (possibly partial) `data`
/// and are handed to callers unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLResponse {
    /// Successful response with the given data
    pub fn from_data(data: Value) -> Self {
        Self { data: Some(data), ..Self::default() }
    }

    /// Response carrying only errors
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self { errors, ..Self::default() }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// True when any error carries the UNAUTHENTICATED code
    pub fn is_unauthenticated(&self) -> bool {
        self.errors.iter().any(GraphQLError::is_unauthenticated)
    }
}

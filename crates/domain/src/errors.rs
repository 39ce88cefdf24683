//! Transport error taxonomy
//!
//! Every failure the transport layer can surface to a caller. The
//! [`ErrorCategory`] drives recovery: network failures are retried,
//! authentication failures go through the refresh path, everything else is
//! handed back untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::GraphQLError;

/// Recovery class of a [`TransportError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity, timeouts, 5xx/429 - retried with backoff
    Network,
    /// 401/403 or UNAUTHENTICATED - owned by the refresh path, never retried
    Authentication,
    /// Well-formed GraphQL errors - passed through, never retried
    Application,
    /// Malformed requests/responses, protocol violations and other 4xx -
    /// non-retryable
    Client,
    /// Configuration or caller-side problems - non-retryable
    Config,
}

/// Errors surfaced by the GraphQL transport
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

fn join_messages(errors: &[GraphQLError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join(", ")
}

impl TransportError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Server { .. } | Self::Timeout(_) => ErrorCategory::Network,
            Self::Auth(_) | Self::SessionExpired(_) => ErrorCategory::Authentication,
            Self::GraphQL(_) => ErrorCategory::Application,
            Self::Client(_) | Self::Protocol(_) => ErrorCategory::Client,
            Self::Config(_) | Self::Cancelled => ErrorCategory::Config,
        }
    }

    /// Transient, non-authentication failures are the only retryable ones
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Network
    }

    /// True for failures owned by the refresh path
    pub fn is_auth(&self) -> bool {
        self.category() == ErrorCategory::Authentication
    }

    /// Map an HTTP status to the matching error.
    ///
    /// 401/403 are authentication failures; 429 and 5xx are transient.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            429 | 500..=599 => Self::Server { status, message },
            _ => Self::Client(format!("HTTP {status}: {message}")),
        }
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

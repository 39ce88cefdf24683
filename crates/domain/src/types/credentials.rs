//! Credential pair and refresh endpoint payload

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::graphql::GraphQLError;

/// Access/refresh credential tuple used to authenticate requests.
///
/// Absence of a pair means the session is unauthenticated. `expires_at` is
/// only known when the backend reported a lifetime (`expiresIn`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Bearer credential attached to outgoing operations
    pub access_token: String,

    /// Credential exchanged for a fresh access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry of the access token (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialPair {
    /// Create a pair with no known expiry
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token, expires_at: None }
    }

    /// Set the expiry from a lifetime in seconds. Non-positive lifetimes and
    /// lifetimes too large to represent as a timestamp clear it.
    #[must_use]
    pub fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_at = (expires_in > 0)
            .then(|| TimeDelta::try_seconds(expires_in))
            .flatten()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        self
    }

    /// True when the access token expires within `threshold_seconds`.
    /// A pair without expiry information is never considered expiring.
    #[must_use]
    pub fn is_expiring(&self, threshold_seconds: i64) -> bool {
        self.seconds_until_expiry().is_some_and(|remaining| remaining <= threshold_seconds)
    }

    /// Seconds until the access token expires, if known
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Payload returned by the refresh endpoint.
///
/// Wire format: `{success, accessToken?, errors?, expiresIn?}`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl RefreshResponse {
    /// The new access token when the refresh was granted.
    ///
    /// A `success: true` payload without a token is treated as denied.
    #[must_use]
    pub fn granted_token(&self) -> Option<&str> {
        if self.success {
            self.access_token.as_deref().filter(|token| !token.is_empty())
        } else {
            None
        }
    }

    /// Human-readable reason for a denied refresh
    #[must_use]
    pub fn denial_reason(&self) -> String {
        if self.errors.is_empty() {
            "refresh endpoint reported failure".to_string()
        } else {
            self.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join(", ")
        }
    }
}

impl fmt::Debug for RefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshResponse")
            .field("success", &self.success)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("errors", &self.errors)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

//! Conversions from external infrastructure errors into domain errors.

use std::time::Duration;

use graphlink_core::CredentialStoreError;
use graphlink_domain::TransportError;
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Extension trait to make the conversion logic explicit at call sites.
pub(crate) trait IntoTransportError {
    fn into_transport(self) -> TransportError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

/// Map a reqwest failure; `timeout` is the per-request limit that applied.
pub(crate) fn http_error(err: &HttpError, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(timeout);
    }

    if err.is_connect() {
        return TransportError::Network(format!("HTTP connection failure: {err}"));
    }

    if let Some(status) = err.status() {
        let code = status.as_u16();
        return TransportError::from_status(
            code,
            status.canonical_reason().unwrap_or("unknown status"),
        );
    }

    if err.is_builder() {
        return TransportError::Client(format!("invalid HTTP request: {err}"));
    }

    if err.is_decode() {
        return TransportError::Protocol(format!("malformed response body: {err}"));
    }

    TransportError::Network(err.to_string())
}

/* -------------------------------------------------------------------------- */
/* tungstenite::Error → TransportError */
/* -------------------------------------------------------------------------- */

impl IntoTransportError for WsError {
    fn into_transport(self) -> TransportError {
        match self {
            WsError::Http(response) => {
                TransportError::from_status(response.status().as_u16(), "WebSocket upgrade rejected")
            }
            WsError::Url(err) => TransportError::Config(format!("invalid WebSocket URL: {err}")),
            WsError::Protocol(err) => TransportError::Protocol(err.to_string()),
            WsError::Utf8 => TransportError::Protocol("invalid UTF-8 in text frame".into()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::Network("WebSocket connection closed".into())
            }
            other => TransportError::Network(format!("WebSocket error: {other}")),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → TransportError */
/* -------------------------------------------------------------------------- */

impl IntoTransportError for serde_json::Error {
    fn into_transport(self) -> TransportError {
        TransportError::Protocol(format!("invalid JSON payload: {self}"))
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → CredentialStoreError */
/* -------------------------------------------------------------------------- */

pub(crate) fn credential_error(err: KeyringError) -> CredentialStoreError {
    match err {
        KeyringError::BadEncoding(_) => {
            CredentialStoreError::Corrupt("credential in keychain is not valid UTF-8".into())
        }
        KeyringError::PlatformFailure(err) => {
            CredentialStoreError::Backend(format!("keychain platform error: {err}"))
        }
        KeyringError::NoStorageAccess(err) => {
            CredentialStoreError::Backend(format!("unable to access secure storage: {err}"))
        }
        KeyringError::Ambiguous(entries) => CredentialStoreError::Backend(format!(
            "multiple keychain entries matched request ({} results)",
            entries.len()
        )),
        other => CredentialStoreError::Backend(other.to_string()),
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

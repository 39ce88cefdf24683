//! Mapping of third-party failures onto the transport's error types.

mod conversions;

pub(crate) use conversions::{credential_error, http_error, IntoTransportError};

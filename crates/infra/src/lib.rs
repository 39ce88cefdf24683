//! # GraphLink Infrastructure
//!
//! Network and platform implementations of the core ports.
//!
//! This crate contains:
//! - The reqwest HTTP transport and refresh client
//! - The `graphql-transport-ws` streaming transport (tokio-tungstenite)
//! - Keychain credential persistence
//! - Configuration loading and logging setup
//! - [`GraphLinkClientBuilder`], which wires all of it together
//!
//! ## Architecture
//! - Implements traits defined in `graphlink-core`
//! - Contains all I/O

pub mod client;
pub mod config;
pub mod credentials;
mod errors;
pub mod graphql;
pub mod http;
pub mod observability;

pub use client::{retry_config, GraphLinkClientBuilder};
pub use credentials::KeychainCredentialStore;
pub use graphql::{GraphQLRefreshClient, HttpTransport, WebSocketConfig, WebSocketTransport};
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, LogFormat};

//! # GraphLink Domain
//!
//! Data types shared by every layer of the GraphQL transport.
//!
//! This crate contains:
//! - Credential pairs and refresh payloads
//! - Operations, GraphQL requests/responses and operation-kind detection
//! - The transport error taxonomy and Result alias
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other GraphLink crates
//! - Only external dependencies allowed
//! - No I/O

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;

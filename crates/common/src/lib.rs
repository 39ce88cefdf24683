//! Generic utilities shared across GraphLink crates.
//!
//! Only domain-agnostic building blocks live here; nothing in this crate
//! knows about GraphQL, credentials or transports.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;

pub use resilience::{RetryConfig, RetryExecutor, RetryPolicy};

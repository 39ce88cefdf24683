//! Resilience patterns for transient failures
//!
//! Generic retry support: a [`RetryExecutor`] driven by a [`RetryPolicy`]
//! with exponential backoff and jitter. The executor is independent of any
//! particular error type; transport-specific classification lives with the
//! callers.

pub mod retry;

pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryOutcome,
    RetryPolicy, RetryResult,
};

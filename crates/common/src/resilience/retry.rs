//! Generic retry executor with exponential backoff and jitter
//!
//! The executor is generic over the operation's error type; a
//! [`RetryPolicy`] decides per failure whether another attempt is allowed.
//! Both terminal outcomes (exhaustion and a non-retryable stop) hand the
//! underlying error back to the caller so nothing is swallowed.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("All retry attempts exhausted after {attempts} tries: {source:?}")]
    AttemptsExhausted { attempts: u32, source: E },

    /// The operation failed with a non-retryable error
    #[error("Operation failed with non-retryable error: {source:?}")]
    NonRetryable { source: E },

    /// The retry strategy configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Recover the operation error that ended the retry loop.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including the result and the delays used.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    /// Delay slept before each retry, in order.
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Total time spent sleeping between attempts.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Determine if the error should be retried
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after the configured backoff delay
    Retry,
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the un-jittered delay for the given (0-based) retry
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }

    /// Upper bound any delay (jitter included) is clamped to
    pub fn max_delay(&self) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { max_delay, .. } => *max_delay,
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Adds up to `factor * delay` on top of the calculated delay.
    ///
    /// With `factor < base - 1` successive exponential delays stay strictly
    /// increasing until the cap is reached.
    Proportional(f64),
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        match self {
            Self::None => delay,
            Self::Proportional(factor) => {
                let spread = (millis as f64 * factor.max(0.0)) as u64;
                if spread == 0 {
                    return delay;
                }
                delay + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the initial one included
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(300),
                base: 2.0,
                max_delay: Duration::from_secs(10),
            },
            jitter: Jitter::Proportional(0.5),
        }
    }
}

impl RetryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
            _ => {}
        }

        if let Jitter::Proportional(factor) = self.jitter {
            if !(0.0..1.0).contains(&factor) {
                return Err(RetryError::InvalidConfiguration {
                    message: "proportional jitter factor must be in [0, 1)".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Jittered delay before retry number `attempt` (0-based), clamped to
    /// the backoff's maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.calculate_delay(attempt);
        self.jitter.apply(base).min(self.backoff.max_delay())
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// The configuration this executor runs with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delays = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            let attempt_number = attempt + 1;
            debug!(attempt = attempt_number, max_attempts, "executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt_number, delays };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(error = ?error, "retry policy declined to retry");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { source: error }),
                        attempts: attempt_number,
                        delays,
                    };
                }
                _ if attempt_number >= max_attempts => {
                    warn!(attempts = attempt_number, error = ?error, "all retry attempts exhausted");
                    return RetryOutcome {
                        result: Err(RetryError::AttemptsExhausted {
                            attempts: attempt_number,
                            source: error,
                        }),
                        attempts: attempt_number,
                        delays,
                    };
                }
                RetryDecision::Retry => self.config.delay_for(attempt),
            };

            warn!(attempt = attempt_number, ?delay, error = ?error, "operation failed, retrying");
            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}

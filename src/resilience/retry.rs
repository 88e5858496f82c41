//! Retry policy and executor
//!
//! [`RetryPolicy`] decides whether an error is worth another attempt;
//! [`RetryExecutor`] runs the attempt loop, sleeping between attempts per
//! the backoff strategy. Rate-limit errors carrying explicit Retry-After
//! guidance sleep exactly that long instead.
//!
//! The executor returns a [`RetryOutcome`] carrying the final result plus a
//! per-attempt trace for diagnostics and tests. Callers that only want the
//! value use [`RetryOutcome::into_result`].

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::backoff::BackoffStrategy;
use crate::config::RetryConfig;
use crate::error::{ApiError, ApiErrorKind};

/// Which errors are eligible for retry, and how many times
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,

    /// Error kinds eligible for retry
    pub retryable_kinds: HashSet<ApiErrorKind>,

    /// Error kinds that short-circuit regardless of remaining attempts
    pub non_retryable_kinds: HashSet<ApiErrorKind>,

    /// HTTP status codes eligible for retry (checked when the error carries
    /// a status)
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retryable_kinds: HashSet::from([
                ApiErrorKind::Network,
                ApiErrorKind::Timeout,
                ApiErrorKind::Server,
                ApiErrorKind::RateLimited,
            ]),
            non_retryable_kinds: HashSet::from([
                ApiErrorKind::Authentication,
                ApiErrorKind::Permission,
                ApiErrorKind::Validation,
                ApiErrorKind::NotFound,
                ApiErrorKind::CircuitOpen,
                ApiErrorKind::InvalidResponse,
            ]),
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// Build a policy from retry configuration, keeping the default kind sets
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retryable_status_codes: config.retryable_status_codes.clone(),
            ..Self::default()
        }
    }

    /// Whether `err` should be retried after `attempt` attempts have run
    pub fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        if attempt > self.max_retries {
            return false;
        }

        let kind = err.kind();
        if self.non_retryable_kinds.contains(&kind) {
            return false;
        }
        if !self.retryable_kinds.contains(&kind) {
            return false;
        }

        // Errors carrying a status must also pass the status allowlist
        match err.status_code() {
            Some(code) => self.retryable_status_codes.contains(&code),
            None => true,
        }
    }
}

/// One entry of the per-attempt trace
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,

    /// The error this attempt produced, None on success
    pub error: Option<String>,

    /// How long the executor slept after this attempt
    pub waited: Duration,
}

/// Result of an executed attempt sequence
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final value or the last error
    pub result: Result<T, ApiError>,

    /// Total attempts performed
    pub attempts: u32,

    /// Wall-clock time across all attempts and sleeps
    pub elapsed: Duration,

    /// Per-attempt diagnostics
    pub trace: Vec<AttemptRecord>,
}

impl<T> RetryOutcome<T> {
    /// Whether the sequence ended in success
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Unwrap into the plain result, discarding diagnostics
    pub fn into_result(self) -> Result<T, ApiError> {
        self.result
    }
}

/// Runs operations with retry and backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    backoff: BackoffStrategy,
}

impl RetryExecutor {
    /// Create an executor from a policy and backoff strategy
    pub fn new(policy: RetryPolicy, backoff: BackoffStrategy) -> Self {
        Self { policy, backoff }
    }

    /// Create an executor from retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            RetryPolicy::from_config(config),
            BackoffStrategy::from_config(config),
        )
    }

    /// The policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` with up to `max_retries + 1` attempts
    ///
    /// Rate-limit errors carrying Retry-After guidance sleep exactly that
    /// duration; everything else sleeps per the backoff strategy.
    /// Non-retryable errors return after the first attempt.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let started = Instant::now();
        let mut trace = Vec::new();
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => {
                    trace.push(AttemptRecord {
                        attempt,
                        error: None,
                        waited: Duration::ZERO,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        trace,
                    };
                }
                Err(err) => {
                    if !self.policy.should_retry(&err, attempt) {
                        if attempt > self.policy.max_retries {
                            warn!(
                                attempts = attempt,
                                max_retries = self.policy.max_retries,
                                error = %err,
                                "Retries exhausted"
                            );
                        }
                        trace.push(AttemptRecord {
                            attempt,
                            error: Some(err.to_string()),
                            waited: Duration::ZERO,
                        });
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            elapsed: started.elapsed(),
                            trace,
                        };
                    }

                    // Honor the server's guidance over computed backoff
                    let wait = match err.retry_after_secs() {
                        Some(secs) => Duration::from_secs(secs),
                        None => self.backoff.delay(attempt),
                    };

                    debug!(
                        attempt = attempt,
                        max_retries = self.policy.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );

                    trace.push(AttemptRecord {
                        attempt,
                        error: Some(err.to_string()),
                        waited: wait,
                    });

                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

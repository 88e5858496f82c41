//! Resilience layer for remote API calls
//!
//! Wraps the workspace client with configurable retry/backoff and
//! failure-isolation:
//!
//! - [`backoff`]: exponential backoff with jitter
//! - [`retry`]: retry policy and executor with a per-attempt trace
//! - [`breaker`]: three-state circuit breaker over the shared state store
//! - [`decorators`]: [`RetryingClient`] and [`CircuitBreakingClient`]
//!   wrappers implementing the same [`crate::remote::WorkspaceApi`] trait as
//!   the base client
//!
//! The standard composition is retry outside, breaker inside:
//! `Retrying(CircuitBreaking(Http))`, built by [`resilient_client`]. That
//! order lets a retry wait out a brief open-breaker window instead of
//! failing the whole operation immediately.

pub mod backoff;
pub mod breaker;
pub mod decorators;
pub mod retry;

pub use backoff::BackoffStrategy;
pub use breaker::{CircuitBreaker, CircuitState};
pub use decorators::{CircuitBreakingClient, RetryingClient};
pub use retry::{AttemptRecord, RetryExecutor, RetryOutcome, RetryPolicy};

use std::sync::Arc;

use crate::config::{BreakerConfig, RetryConfig};
use crate::coordination::StateStore;
use crate::remote::HttpWorkspaceClient;

/// Compose the standard resilient client stack around an HTTP client
pub fn resilient_client(
    http: HttpWorkspaceClient,
    retry_config: &RetryConfig,
    breaker_config: BreakerConfig,
    state: Arc<dyn StateStore>,
) -> RetryingClient<CircuitBreakingClient<HttpWorkspaceClient>> {
    let breaker = CircuitBreaker::new(breaker_config, state);
    let executor = RetryExecutor::new(
        RetryPolicy::from_config(retry_config),
        BackoffStrategy::from_config(retry_config),
    );
    RetryingClient::new(CircuitBreakingClient::new(http, breaker), executor)
}

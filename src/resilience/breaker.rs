//! Circuit breaker over the shared state store
//!
//! Three states: `closed` (calls pass through), `open` (calls rejected
//! immediately), `half-open` (exactly one trial call permitted). The
//! breaker opens after `failure_threshold` consecutive recorded failures,
//! permits a trial once `recovery_timeout` has elapsed since the last
//! recorded failure, closes on a trial success, and reopens on a trial
//! failure.
//!
//! State lives in the shared [`StateStore`], not process memory, so every
//! scheduler worker observes the same breaker. The half-open trial slot is
//! claimed with a compare-and-swap, which is what makes "exactly one trial"
//! hold across workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::coordination::StateStore;
use crate::error::StateError;

/// Breaker state machine states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted
    #[default]
    Closed,
    /// Calls are rejected immediately
    Open,
    /// One trial call is in flight
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{}", name)
    }
}

/// Persisted breaker state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

/// Distributed three-state circuit breaker
pub struct CircuitBreaker {
    config: BreakerConfig,
    store: Arc<dyn StateStore>,
}

impl CircuitBreaker {
    const KEY_PREFIX: &'static str = "breaker:";

    /// Create a breaker backed by the given state store
    pub fn new(config: BreakerConfig, store: Arc<dyn StateStore>) -> Self {
        Self { config, store }
    }

    /// Breaker identity
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn key(&self) -> String {
        format!("{}{}", Self::KEY_PREFIX, self.config.name)
    }

    /// Snapshot TTL: comfortably longer than the recovery window so state
    /// survives quiet periods, while still self-cleaning eventually
    fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs((self.config.recovery_timeout_secs * 4).max(3600))
    }

    fn recovery_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.recovery_timeout_secs as i64)
    }

    async fn load(&self) -> Result<(Snapshot, Option<String>), StateError> {
        match self.store.get(&self.key()).await? {
            Some(raw) => {
                let snapshot = serde_json::from_str(&raw)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok((snapshot, Some(raw)))
            }
            None => Ok((Snapshot::default(), None)),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StateError> {
        let raw =
            serde_json::to_string(snapshot).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.store.put(&self.key(), &raw, self.snapshot_ttl()).await
    }

    /// Whether a call may proceed right now
    ///
    /// In the open state, once the recovery timeout has elapsed since the
    /// last recorded failure, exactly one caller wins the half-open trial
    /// slot; everyone else keeps getting `false` until the trial resolves.
    pub async fn can_execute(&self) -> Result<bool, StateError> {
        let (snapshot, raw) = self.load().await?;

        match snapshot.state {
            CircuitState::Closed => Ok(true),
            CircuitState::HalfOpen => Ok(false),
            CircuitState::Open => {
                let recovered = snapshot
                    .last_failure_at
                    .map(|at| Utc::now() - at >= self.recovery_timeout())
                    .unwrap_or(true);
                if !recovered {
                    return Ok(false);
                }

                // Claim the single trial slot
                let trial = Snapshot {
                    state: CircuitState::HalfOpen,
                    ..snapshot
                };
                let encoded = serde_json::to_string(&trial)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                let won = self
                    .store
                    .compare_and_swap(
                        &self.key(),
                        raw.as_deref(),
                        &encoded,
                        self.snapshot_ttl(),
                    )
                    .await?;

                if won {
                    info!(breaker = %self.config.name, "Circuit half-open, permitting trial call");
                }
                Ok(won)
            }
        }
    }

    /// Record a successful call: closes the breaker and resets the failure
    /// counter
    pub async fn record_success(&self) -> Result<(), StateError> {
        let (snapshot, _) = self.load().await?;

        if snapshot.state != CircuitState::Closed || snapshot.consecutive_failures > 0 {
            if snapshot.state == CircuitState::HalfOpen {
                info!(breaker = %self.config.name, "Trial call succeeded, closing circuit");
            }
            self.save(&Snapshot::default()).await?;
        }
        Ok(())
    }

    /// Record a failed call
    ///
    /// A failure during the half-open trial reopens immediately; otherwise
    /// the consecutive counter advances and opens the breaker at the
    /// threshold.
    pub async fn record_failure(&self) -> Result<(), StateError> {
        let (snapshot, _) = self.load().await?;
        let now = Utc::now();

        let next = match snapshot.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.config.name, "Trial call failed, reopening circuit");
                Snapshot {
                    state: CircuitState::Open,
                    consecutive_failures: snapshot.consecutive_failures,
                    last_failure_at: Some(now),
                    opened_at: Some(now),
                }
            }
            _ => {
                let failures = snapshot.consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    if snapshot.state == CircuitState::Closed {
                        warn!(
                            breaker = %self.config.name,
                            failures = failures,
                            "Failure threshold reached, opening circuit"
                        );
                    }
                    Snapshot {
                        state: CircuitState::Open,
                        consecutive_failures: failures,
                        last_failure_at: Some(now),
                        opened_at: snapshot.opened_at.or(Some(now)),
                    }
                } else {
                    debug!(
                        breaker = %self.config.name,
                        failures = failures,
                        threshold = self.config.failure_threshold,
                        "Recorded failure"
                    );
                    Snapshot {
                        state: CircuitState::Closed,
                        consecutive_failures: failures,
                        last_failure_at: Some(now),
                        opened_at: None,
                    }
                }
            }
        };

        self.save(&next).await
    }

    /// Current state as stored
    pub async fn state(&self) -> Result<CircuitState, StateError> {
        Ok(self.load().await?.0.state)
    }

    /// Consecutive failures as stored
    pub async fn consecutive_failures(&self) -> Result<u32, StateError> {
        Ok(self.load().await?.0.consecutive_failures)
    }

    /// Force the breaker back to closed (operator escape hatch)
    pub async fn reset(&self) -> Result<(), StateError> {
        self.store.delete(&self.key()).await
    }
}

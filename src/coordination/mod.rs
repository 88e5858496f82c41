//! Shared coordination state
//!
//! Circuit-breaker state, sync leases, and force-sync markers must be
//! observable by every scheduler worker, so they live behind the
//! [`StateStore`] trait: a TTL-bound key store with atomic compare-and-swap.
//! The in-memory implementation in [`memory`] covers single-host
//! deployments; a Redis-backed implementation can be slotted in behind the
//! same trait for multi-process fleets.

pub mod lease;
pub mod memory;

pub use lease::{Lease, LeaseManager};
pub use memory::MemoryStateStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StateError;

/// Shared, atomically-updatable TTL key store
///
/// All mutating operations take a TTL; entries disappear when it lapses,
/// which is what makes crash-safe leases possible. Tests use
/// [`MemoryStateStore`] directly rather than a mock: the semantics under
/// test are the atomic ones.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a live (non-expired) value
    async fn get(&self, key: &str) -> Result<Option<String>, StateError>;

    /// Write a value unconditionally
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateError>;

    /// Write `value` only if the live value equals `expected`
    /// (`expected = None` means "only if absent"). Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateError>;

    /// Delete the key only if the live value equals `expected`. Returns
    /// whether the delete happened.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StateError>;

    /// Delete the key unconditionally
    async fn delete(&self, key: &str) -> Result<(), StateError>;
}

//! TTL-bound mutual-exclusion leases
//!
//! A lease guarantees at-most-one holder per key, even across crashes: the
//! holder that never releases simply lets the TTL lapse. Acquisition is an
//! atomic claim-if-absent on the shared state store; release only succeeds
//! with the ownership token handed out at acquisition, so a worker cannot
//! release a lease it lost to expiry and re-acquisition.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::StateStore;
use crate::error::LockError;

/// Ownership of one acquired lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Fully-qualified store key
    pub key: String,

    /// Ownership token proving this holder acquired the lease
    pub token: String,
}

/// Acquires and releases leases against a shared state store
pub struct LeaseManager {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl LeaseManager {
    const KEY_PREFIX: &'static str = "lease:";

    /// Create a manager issuing leases with the given TTL
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The TTL applied to issued leases
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn full_key(name: &str) -> String {
        format!("{}{}", Self::KEY_PREFIX, name)
    }

    /// Try to acquire the lease for `name`
    ///
    /// Returns `None` when another holder currently owns it. Never blocks
    /// or queues.
    pub async fn acquire(&self, name: &str) -> Result<Option<Lease>, LockError> {
        let key = Self::full_key(name);
        let token = Uuid::new_v4().to_string();

        let won = self
            .store
            .compare_and_swap(&key, None, &token, self.ttl)
            .await?;

        if won {
            debug!(lease = name, "Lease acquired");
            Ok(Some(Lease { key, token }))
        } else {
            debug!(lease = name, "Lease held elsewhere");
            Ok(None)
        }
    }

    /// Release a held lease
    ///
    /// Fails with [`LockError::NotHeld`] when the lease expired and was
    /// re-acquired by someone else in the meantime.
    pub async fn release(&self, lease: &Lease) -> Result<(), LockError> {
        let removed = self
            .store
            .compare_and_delete(&lease.key, &lease.token)
            .await?;

        if removed {
            debug!(lease = %lease.key, "Lease released");
            Ok(())
        } else {
            Err(LockError::NotHeld)
        }
    }

    /// Whether the lease for `name` is currently held by anyone
    pub async fn is_held(&self, name: &str) -> Result<bool, LockError> {
        Ok(self.store.get(&Self::full_key(name)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStateStore;

    fn manager(ttl_ms: u64) -> LeaseManager {
        LeaseManager::new(
            Arc::new(MemoryStateStore::new()),
            Duration::from_millis(ttl_ms),
        )
    }

    // Test 1: Acquire and release round-trip
    #[tokio::test]
    async fn test_acquire_release() {
        let leases = manager(60_000);

        let lease = leases.acquire("db-1").await.unwrap().expect("should acquire");
        assert!(leases.is_held("db-1").await.unwrap());

        leases.release(&lease).await.unwrap();
        assert!(!leases.is_held("db-1").await.unwrap());
    }

    // Test 2: Second acquisition is refused while held
    #[tokio::test]
    async fn test_contention_refused() {
        let leases = manager(60_000);

        let _held = leases.acquire("db-1").await.unwrap().expect("should acquire");
        let second = leases.acquire("db-1").await.unwrap();

        assert!(second.is_none());
    }

    // Test 3: Leases for different keys are independent
    #[tokio::test]
    async fn test_independent_keys() {
        let leases = manager(60_000);

        let a = leases.acquire("db-1").await.unwrap();
        let b = leases.acquire("db-2").await.unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
    }

    // Test 4: An expired lease can be re-acquired
    #[tokio::test]
    async fn test_expiry_frees_lease() {
        let leases = manager(20);

        let _held = leases.acquire("db-1").await.unwrap().expect("should acquire");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = leases.acquire("db-1").await.unwrap();
        assert!(second.is_some());
    }

    // Test 5: Releasing after expiry-and-reacquisition fails with NotHeld
    #[tokio::test]
    async fn test_stale_release_refused() {
        let leases = manager(20);

        let stale = leases.acquire("db-1").await.unwrap().expect("should acquire");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let _fresh = leases.acquire("db-1").await.unwrap().expect("should acquire");

        let result = leases.release(&stale).await;
        assert_eq!(result.unwrap_err(), LockError::NotHeld);
    }

    // Test 6: Exactly one of many concurrent claimants wins
    #[tokio::test]
    async fn test_single_winner_under_contention() {
        let leases = Arc::new(manager(60_000));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let leases = Arc::clone(&leases);
            handles.push(tokio::spawn(
                async move { leases.acquire("db-1").await.unwrap() },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

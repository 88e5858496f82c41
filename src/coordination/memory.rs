//! In-memory state store
//!
//! Single-process implementation of [`StateStore`]. Suitable for one-host
//! deployments and tests; multi-process fleets should use a networked
//! backend (Redis or similar) behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::StateStore;
use crate::error::StateError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory [`StateStore`] with lazy expiry
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(value: &str, ttl: Duration) -> Result<Entry, StateError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StateError::Backend(format!("TTL out of range: {}", e)))?;
        Ok(Entry {
            value: value.to_string(),
            expires_at: Utc::now() + ttl,
        })
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let mut entries = self.entries.write().await;

        let expired = entries.get(key).map(Entry::is_expired).unwrap_or(false);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateError> {
        let entry = Self::entry(value, ttl)?;
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let entry = Self::entry(value, ttl)?;
        let mut entries = self.entries.write().await;

        let live = entries.get(key).filter(|e| !e.is_expired());
        let matches = match (live, expected) {
            (None, None) => true,
            (Some(e), Some(expected)) => e.value == expected,
            _ => false,
        };

        if matches {
            entries.insert(key.to_string(), entry);
        }
        Ok(matches)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StateError> {
        let mut entries = self.entries.write().await;

        let matches = entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value == expected)
            .unwrap_or(false);

        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Basic put and get
    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    // Test 2: Entries expire after their TTL
    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    // Test 3: compare_and_swap with expected=None succeeds only when absent
    #[tokio::test]
    async fn test_cas_absent() {
        let store = MemoryStateStore::new();

        let won = store
            .compare_and_swap("k1", None, "v1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(won);

        // Second claim loses
        let won = store
            .compare_and_swap("k1", None, "v2", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!won);
        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
    }

    // Test 4: compare_and_swap with expected value
    #[tokio::test]
    async fn test_cas_expected_value() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();

        let swapped = store
            .compare_and_swap("k1", Some("wrong"), "v2", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!swapped);

        let swapped = store
            .compare_and_swap("k1", Some("v1"), "v2", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(swapped);
        assert_eq!(store.get("k1").await.unwrap(), Some("v2".to_string()));
    }

    // Test 5: An expired entry counts as absent for compare_and_swap
    #[tokio::test]
    async fn test_cas_after_expiry() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let won = store
            .compare_and_swap("k1", None, "v2", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(won);
    }

    // Test 6: compare_and_delete removes only the expected value
    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.compare_and_delete("k1", "other").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));

        assert!(store.compare_and_delete("k1", "v1").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    // Test 7: Unconditional delete is idempotent
    #[tokio::test]
    async fn test_delete_idempotent() {
        let store = MemoryStateStore::new();
        store
            .put("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();

        store.delete("k1").await.unwrap();
        store.delete("k1").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);
    }
}

//! Short-TTL read cache for remote lookups
//!
//! Keys cover the three lookup shapes the sync engine repeats: database
//! metadata, single pages, and query results (keyed by a hash of the query
//! request). Entries expire after a fixed TTL and are invalidated explicitly
//! on mutation or schema refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::remote::api::QueryRequest;

/// Statistics about cache usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries
    pub entries: u64,
    /// Lookup hits
    pub hits: u64,
    /// Lookup misses
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
}

/// TTL read cache for remote lookups
pub struct CacheService {
    ttl: Duration,
    state: Arc<RwLock<CacheState>>,
}

impl CacheService {
    /// Create a cache with the given entry TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// Create a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs))
    }

    /// Key for database metadata
    pub fn database_key(database_id: &str) -> String {
        format!("db:{}", database_id)
    }

    /// Key for a single page
    pub fn page_key(page_id: &str) -> String {
        format!("page:{}", page_id)
    }

    /// Key for a query result under a database
    pub fn query_key(database_id: &str, query_hash: &str) -> String {
        format!("query:{}:{}", database_id, query_hash)
    }

    /// Stable hash of a query request, for query-result keys
    pub fn query_hash(request: &QueryRequest) -> String {
        let encoded = serde_json::to_string(request).unwrap_or_default();
        hex::encode(Sha256::digest(encoded.as_bytes()))
    }

    /// Look up a cached value
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut state = self.state.write().await;

        let expired = state
            .entries
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);
        if expired {
            state.entries.remove(key);
        }

        let value = state.entries.get(key).map(|entry| entry.value.clone());
        match value {
            Some(value) => {
                state.hits += 1;
                Some(value)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store a value under `key`
    pub async fn set(&self, key: &str, value: serde_json::Value) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self.state
            .write()
            .await
            .entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    /// Drop one entry
    pub async fn invalidate(&self, key: &str) {
        self.state.write().await.entries.remove(key);
    }

    /// Drop the database entry and every query result cached under it
    pub async fn invalidate_database(&self, database_id: &str) {
        let db_key = Self::database_key(database_id);
        let query_prefix = format!("query:{}:", database_id);

        let mut state = self.state.write().await;
        state
            .entries
            .retain(|key, _| key != &db_key && !key.starts_with(&query_prefix));
    }

    /// Drop everything
    pub async fn purge(&self) {
        self.state.write().await.entries.clear();
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            entries: state.entries.len() as u64,
            hits: state.hits,
            misses: state.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_ms: u64) -> CacheService {
        CacheService::new(Duration::from_millis(ttl_ms))
    }

    // Test 1: Set and get round-trip
    #[tokio::test]
    async fn test_set_get() {
        let cache = cache(60_000);
        let key = CacheService::page_key("page-1");

        cache.set(&key, serde_json::json!({"title": "A page"})).await;

        let value = cache.get(&key).await.unwrap();
        assert_eq!(value["title"], "A page");
    }

    // Test 2: Miss on unknown key
    #[tokio::test]
    async fn test_miss() {
        let cache = cache(60_000);
        assert!(cache.get("page:unknown").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    // Test 3: Entries expire after the TTL
    #[tokio::test]
    async fn test_expiry() {
        let cache = cache(20);
        let key = CacheService::database_key("db-1");
        cache.set(&key, serde_json::json!(1)).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&key).await.is_none());
    }

    // Test 4: Explicit invalidation drops the entry
    #[tokio::test]
    async fn test_invalidate() {
        let cache = cache(60_000);
        let key = CacheService::page_key("page-1");
        cache.set(&key, serde_json::json!(1)).await;

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    // Test 5: Database invalidation sweeps its query results
    #[tokio::test]
    async fn test_invalidate_database() {
        let cache = cache(60_000);

        cache
            .set(&CacheService::database_key("db-1"), serde_json::json!(1))
            .await;
        cache
            .set(&CacheService::query_key("db-1", "h1"), serde_json::json!(2))
            .await;
        cache
            .set(&CacheService::query_key("db-2", "h1"), serde_json::json!(3))
            .await;
        cache
            .set(&CacheService::page_key("page-1"), serde_json::json!(4))
            .await;

        cache.invalidate_database("db-1").await;

        assert!(cache.get(&CacheService::database_key("db-1")).await.is_none());
        assert!(cache
            .get(&CacheService::query_key("db-1", "h1"))
            .await
            .is_none());
        // Other databases and page entries survive
        assert!(cache
            .get(&CacheService::query_key("db-2", "h1"))
            .await
            .is_some());
        assert!(cache.get(&CacheService::page_key("page-1")).await.is_some());
    }

    // Test 6: Query hash is stable for equal requests, distinct otherwise
    #[test]
    fn test_query_hash() {
        let a = QueryRequest::page_sized(100);
        let b = QueryRequest::page_sized(100);
        let c = QueryRequest::page_sized(50);

        assert_eq!(CacheService::query_hash(&a), CacheService::query_hash(&b));
        assert_ne!(CacheService::query_hash(&a), CacheService::query_hash(&c));
    }

    // Test 7: Stats count hits and misses
    #[tokio::test]
    async fn test_stats() {
        let cache = cache(60_000);
        let key = CacheService::page_key("page-1");
        cache.set(&key, serde_json::json!(1)).await;

        cache.get(&key).await;
        cache.get(&key).await;
        cache.get("page:other").await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 66.66).abs() < 1.0);
    }

    // Test 8: Purge clears everything
    #[tokio::test]
    async fn test_purge() {
        let cache = cache(60_000);
        cache.set("a", serde_json::json!(1)).await;
        cache.set("b", serde_json::json!(2)).await;

        cache.purge().await;
        assert_eq!(cache.stats().await.entries, 0);
    }
}

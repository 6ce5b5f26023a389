//! In-process shared-cache backend.
//!
//! Implements the full `SharedCache` contract against a process-local map
//! with real TTL expiry and wildcard key enumeration. Used as the test
//! backend and as a stand-in for single-process deployments that still want
//! cross-handle cache semantics.
//!
//! The backend keeps per-operation counters so tests can assert how many
//! round-trips an engine operation produced.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::shared::SharedCache;
use crate::error::{EngineError, EngineResult};

/// Snapshot of the operation counters of a `MemorySharedCache`
#[derive(Debug, Clone, Default)]
pub struct SharedCacheStats {
    /// `get` calls issued
    pub gets: u64,
    /// `mget` calls issued (batches, not keys)
    pub mgets: u64,
    /// `set_ex` calls issued
    pub sets: u64,
    /// `mset_ex` calls issued (batches, not entries)
    pub msets: u64,
    /// `exists` calls issued
    pub exists_calls: u64,
    /// `del` calls issued
    pub dels: u64,
    /// `keys` calls issued
    pub key_scans: u64,
    /// Keys answered with a live value
    pub hits: u64,
    /// Keys answered absent or expired
    pub misses: u64,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local `SharedCache` backend with TTL and wildcard enumeration
#[derive(Default)]
pub struct MemorySharedCache {
    entries: DashMap<String, Entry>,
    ready: AtomicBool,
    gets: AtomicU64,
    mgets: AtomicU64,
    sets: AtomicU64,
    msets: AtomicU64,
    exists_calls: AtomicU64,
    dels: AtomicU64,
    key_scans: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemorySharedCache {
    /// Create an empty, ready backend
    pub fn new() -> Self {
        let cache = Self::default();
        cache.ready.store(true, Ordering::Relaxed);
        cache
    }

    /// Flip the readiness probe; while unready the engine skips this tier
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Snapshot the operation counters
    pub fn stats(&self) -> SharedCacheStats {
        SharedCacheStats {
            gets: self.gets.load(Ordering::Relaxed),
            mgets: self.mgets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            msets: self.msets.load(Ordering::Relaxed),
            exists_calls: self.exists_calls.load(Ordering::Relaxed),
            dels: self.dels.load(Ordering::Relaxed),
            key_scans: self.key_scans.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn glob_to_regex(pattern: &str) -> EngineResult<Regex> {
        let mut regex_pattern = String::with_capacity(pattern.len() + 4);
        for ch in pattern.chars() {
            match ch {
                '*' => regex_pattern.push_str(".*"),
                c => regex_pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        Regex::new(&format!("^{}$", regex_pattern))
            .map_err(|e| EngineError::SharedCache(format!("invalid key pattern: {}", e)))
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.lookup(key))
    }

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>> {
        self.mgets.fetch_add(1, Ordering::Relaxed);
        Ok(keys.iter().map(|key| self.lookup(key)).collect())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn mset_ex(&self, entries: &[(String, String)], ttl: Duration) -> EngineResult<()> {
        self.msets.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn exists(&self, keys: &[String]) -> EngineResult<u64> {
        self.exists_calls.fetch_add(1, Ordering::Relaxed);
        let count = keys
            .iter()
            .filter(|key| {
                self.entries
                    .get(key.as_str())
                    .map(|e| !e.is_expired())
                    .unwrap_or(false)
            })
            .count();
        Ok(count as u64)
    }

    async fn del(&self, keys: &[String]) -> EngineResult<u64> {
        self.dels.fetch_add(1, Ordering::Relaxed);
        let mut removed = 0;
        for key in keys {
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> EngineResult<Vec<String>> {
        self.key_scans.fetch_add(1, Ordering::Relaxed);
        let regex = Self::glob_to_regex(pattern)?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired() && regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_with_ttl() {
        let cache = MemorySharedCache::new();
        cache
            .set_ex("model:user:1:mail", "a@b.com", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("model:user:1:mail").await.unwrap(),
            Some("a@b.com".to_string())
        );
        assert_eq!(cache.get("model:user:1:nick").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = MemorySharedCache::new();
        cache
            .set_ex("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let cache = MemorySharedCache::new();
        cache.set_ex("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.set_ex("c", "3", Duration::from_secs(60)).await.unwrap();

        let values = cache
            .mget(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_wildcard_enumeration() {
        let cache = MemorySharedCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_ex("model:user:1:mail", "a", ttl).await.unwrap();
        cache.set_ex("model:user:1:nick", "b", ttl).await.unwrap();
        cache.set_ex("model:game:9:name", "c", ttl).await.unwrap();

        let mut keys = cache.keys("model:user:1:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["model:user:1:mail", "model:user:1:nick"]);

        let all_user = cache.keys("model:user:*").await.unwrap();
        assert_eq!(all_user.len(), 2);
    }

    #[tokio::test]
    async fn test_exists_and_del() {
        let cache = MemorySharedCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_ex("x", "1", ttl).await.unwrap();
        cache.set_ex("y", "2", ttl).await.unwrap();

        let keys = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert_eq!(cache.exists(&keys).await.unwrap(), 2);
        assert_eq!(cache.del(&keys).await.unwrap(), 2);
        assert_eq!(cache.exists(&keys).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_readiness_toggle() {
        let cache = MemorySharedCache::new();
        assert!(cache.ready().await);
        cache.set_ready(false);
        assert!(!cache.ready().await);
    }

    #[tokio::test]
    async fn test_op_counters() {
        let cache = MemorySharedCache::new();
        cache.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        let _ = cache.get("k").await.unwrap();
        let _ = cache.get("missing").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}

//! Shared cache client.
//!
//! Thin abstraction over the remote key/value store shared by every process
//! of a deployment. The client moves opaque wire strings; all conversion to
//! and from the wire form is done by field codecs, never here.
//!
//! Failure model: every operation may fail independently. Callers holding a
//! lower tier treat any failure as a miss. The Redis client reports its
//! health through `ready()` so entity handles can skip the tier entirely
//! while the store is unreachable; degradation and recovery are each logged
//! once per transition.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock as TokioRwLock;

use crate::error::{EngineError, EngineResult};

/// Remote key/value store operations used by the engine.
///
/// Wire values are UTF-8 strings. `mget` preserves the order of its input
/// keys. TTLs are supplied per call; the engine passes the single tier-wide
/// value from its configuration.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetch one value; `None` when the key is absent
    async fn get(&self, key: &str) -> EngineResult<Option<String>>;

    /// Fetch several values, preserving key order
    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>>;

    /// Store one value with a TTL
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()>;

    /// Store several values, each with the same TTL
    async fn mset_ex(&self, entries: &[(String, String)], ttl: Duration) -> EngineResult<()>;

    /// Count how many of the given keys exist
    async fn exists(&self, keys: &[String]) -> EngineResult<u64>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> EngineResult<u64>;

    /// Enumerate keys matching a wildcard pattern
    async fn keys(&self, pattern: &str) -> EngineResult<Vec<String>>;

    /// Whether the store is currently reachable. When false, callers skip
    /// the tier without issuing commands.
    async fn ready(&self) -> bool;
}

/// Redis-backed shared cache
pub struct RedisSharedCache {
    conn: Arc<TokioRwLock<ConnectionManager>>,
    op_timeout: Duration,
    degraded: AtomicBool,
}

impl RedisSharedCache {
    /// Connect to Redis at the given URL.
    ///
    /// The connection manager reconnects automatically after outages;
    /// commands issued while the store is down fail and flip the client
    /// into the degraded state until one succeeds again.
    pub async fn connect(url: &str, op_timeout: Duration) -> EngineResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| EngineError::Config(format!("invalid Redis URL: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| EngineError::SharedCache(format!("Redis connect failed: {}", e)))?;

        Ok(Self {
            conn: Arc::new(TokioRwLock::new(conn)),
            op_timeout,
            degraded: AtomicBool::new(false),
        })
    }

    /// Issue a PING, refreshing the readiness state
    pub async fn probe(&self) -> bool {
        let result: EngineResult<String> = self.run(redis::cmd("PING")).await;
        result.is_ok()
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> EngineResult<T> {
        let mut conn = self.conn.write().await;
        let outcome = tokio::time::timeout(self.op_timeout, cmd.query_async::<_, T>(&mut *conn)).await;
        drop(conn);

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::SharedCache(format!("Redis command failed: {}", e))),
            Err(_) => Err(EngineError::SharedCache(format!(
                "Redis command timed out after {:?}",
                self.op_timeout
            ))),
        };
        self.observe(result.as_ref().err());
        result
    }

    async fn run_pipe(&self, pipe: redis::Pipeline) -> EngineResult<()> {
        let mut conn = self.conn.write().await;
        let outcome = tokio::time::timeout(self.op_timeout, pipe.query_async::<_, ()>(&mut *conn)).await;
        drop(conn);

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::SharedCache(format!("Redis pipeline failed: {}", e))),
            Err(_) => Err(EngineError::SharedCache(format!(
                "Redis pipeline timed out after {:?}",
                self.op_timeout
            ))),
        };
        self.observe(result.as_ref().err());
        result
    }

    /// Track degradation transitions, logging each direction once
    fn observe(&self, error: Option<&EngineError>) {
        match error {
            Some(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    log::warn!("Shared cache degraded, treating tier as a miss: {}", e);
                }
            }
            None => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    log::info!("Shared cache recovered");
                }
            }
        }
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.run(cmd).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()> {
        let mut cmd = redis::cmd("SETEX");
        cmd.arg(key).arg(ttl.as_secs()).arg(value);
        self.run(cmd).await
    }

    async fn mset_ex(&self, entries: &[(String, String)], ttl: Duration) -> EngineResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.cmd("MSET");
        for (key, value) in entries {
            pipe.arg(key).arg(value);
        }
        pipe.ignore();
        for (key, _) in entries {
            pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs()).ignore();
        }
        self.run_pipe(pipe).await
    }

    async fn exists(&self, keys: &[String]) -> EngineResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(keys);
        self.run(cmd).await
    }

    async fn del(&self, keys: &[String]) -> EngineResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.run(cmd).await
    }

    async fn keys(&self, pattern: &str) -> EngineResult<Vec<String>> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.run(cmd).await
    }

    async fn ready(&self) -> bool {
        !self.degraded.load(Ordering::Relaxed)
    }
}

/// Shared cache stand-in for deployments running without Redis.
///
/// Never ready, so entity handles skip the tier; the operations answer with
/// empty results in case a caller issues them anyway.
#[derive(Debug, Default)]
pub struct DisabledSharedCache;

#[async_trait]
impl SharedCache for DisabledSharedCache {
    async fn get(&self, _key: &str) -> EngineResult<Option<String>> {
        Ok(None)
    }

    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<String>>> {
        Ok(vec![None; keys.len()])
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn mset_ex(&self, _entries: &[(String, String)], _ttl: Duration) -> EngineResult<()> {
        Ok(())
    }

    async fn exists(&self, _keys: &[String]) -> EngineResult<u64> {
        Ok(0)
    }

    async fn del(&self, _keys: &[String]) -> EngineResult<u64> {
        Ok(0)
    }

    async fn keys(&self, _pattern: &str) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn ready(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_is_never_ready() {
        let cache = DisabledSharedCache;
        assert!(!cache.ready().await);
        assert_eq!(cache.get("model:user:x:mail").await.unwrap(), None);
        assert_eq!(
            cache
                .mget(&["a".to_string(), "b".to_string()])
                .await
                .unwrap(),
            vec![None, None]
        );
        assert_eq!(cache.exists(&["a".to_string()]).await.unwrap(), 0);
        assert_eq!(cache.del(&["a".to_string()]).await.unwrap(), 0);
    }
}

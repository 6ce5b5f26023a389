//! Engine context and lifecycle.
//!
//! The `Engine` owns the process-wide tier clients and the per-type
//! managers built on them. It replaces ambient singletons with an explicit
//! context: construct one with `init` (or `with_backends` for injected
//! backends), pass it around, and `close` it on shutdown.

use std::sync::Arc;

use crate::cache::{DisabledSharedCache, RedisSharedCache, SharedCache};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::models::{GameManager, SessionManager, UserManager};
use crate::store::{AuthoritativeStore, MongoStore};

/// Process-wide engine context
pub struct Engine {
    config: EngineConfig,
    shared: Arc<dyn SharedCache>,
    store: Arc<dyn AuthoritativeStore>,
    users: UserManager,
    games: GameManager,
    sessions: SessionManager,
}

impl Engine {
    /// Connect the tier clients described by the configuration and build
    /// the per-type managers.
    ///
    /// The authoritative store must be reachable; the engine cannot run
    /// without it. The shared cache is optional: when it is disabled by
    /// configuration or unreachable at startup, the engine runs on the
    /// local cache and the authoritative store alone.
    pub async fn init(config: EngineConfig) -> EngineResult<Self> {
        let store: Arc<dyn AuthoritativeStore> = Arc::new(
            MongoStore::connect(&config.store_address, &config.store_database).await?,
        );

        let shared: Arc<dyn SharedCache> = if config.redis_enable {
            match RedisSharedCache::connect(
                &config.shared_cache_address,
                config.shared_op_timeout(),
            )
            .await
            {
                Ok(cache) => {
                    cache.probe().await;
                    Arc::new(cache)
                }
                Err(e) => {
                    log::warn!(
                        "Shared cache unreachable at startup, running without it: {}",
                        e
                    );
                    Arc::new(DisabledSharedCache)
                }
            }
        } else {
            log::info!("Shared cache disabled by configuration");
            Arc::new(DisabledSharedCache)
        };

        Self::with_backends(config, shared, store)
    }

    /// Build an engine over injected tier backends
    pub fn with_backends(
        config: EngineConfig,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> EngineResult<Self> {
        let users = UserManager::new(&config, shared.clone(), store.clone())?;
        let games = GameManager::new(&config, shared.clone(), store.clone())?;
        let sessions = SessionManager::new(&config, shared.clone(), store.clone())?;

        Ok(Self {
            config,
            shared,
            store,
            users,
            games,
            sessions,
        })
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// User accounts
    pub fn users(&self) -> &UserManager {
        &self.users
    }

    /// Games
    pub fn games(&self) -> &GameManager {
        &self.games
    }

    /// Login sessions
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The shared-cache client every manager uses
    pub fn shared_cache(&self) -> &Arc<dyn SharedCache> {
        &self.shared
    }

    /// The authoritative-store client every manager uses
    pub fn store(&self) -> &Arc<dyn AuthoritativeStore> {
        &self.store
    }

    /// Flush every entity type: all shared-cache keys and all live local
    /// caches. The per-type flushes are independent and run as one joined
    /// task set.
    pub async fn flush_all(&self) -> EngineResult<()> {
        futures::try_join!(
            self.users.flush(),
            self.games.flush(),
            self.sessions.flush(),
        )?;
        Ok(())
    }

    /// Release the tier clients
    pub async fn close(self) {
        self.store.close().await;
        log::info!("Engine closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::store::MemoryStore;

    fn engine() -> (Engine, Arc<MemorySharedCache>) {
        let shared = Arc::new(MemorySharedCache::new());
        let config = EngineConfig {
            password_hash_cost: 1,
            ..EngineConfig::default()
        };
        let engine = Engine::with_backends(
            config,
            shared.clone(),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        (engine, shared)
    }

    #[tokio::test]
    async fn test_managers_share_backends() {
        let (engine, shared) = engine();
        let user = engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();
        let _ = engine.games().create(user.id(), "Arena").await.unwrap();

        // Reads through either manager land in the one shared cache
        let _ = user.mail().await.unwrap();
        assert!(!shared.is_empty());
    }

    #[tokio::test]
    async fn test_flush_all_empties_the_shared_cache() {
        let (engine, shared) = engine();
        let user = engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();
        let _ = user.mail().await.unwrap();
        let _ = engine.sessions().open(user.id()).await.unwrap();
        assert!(!shared.is_empty());

        engine.flush_all().await.unwrap();
        assert!(shared.is_empty());
    }
}

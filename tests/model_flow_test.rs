// Integration tests for the shipped entity types end to end

#[cfg(test)]
mod model_flow_tests {
    use std::sync::Arc;

    use outpost::cache::MemorySharedCache;
    use outpost::store::MemoryStore;
    use outpost::{Engine, EngineConfig, GameStage};

    fn engine() -> (Engine, Arc<MemorySharedCache>, Arc<MemoryStore>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let shared = Arc::new(MemorySharedCache::new());
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            password_hash_cost: 1,
            session_expire_secs: 3600,
            ..EngineConfig::default()
        };
        let engine = Engine::with_backends(config, shared.clone(), store.clone()).unwrap();
        (engine, shared, store)
    }

    #[tokio::test]
    async fn test_complete_account_workflow() {
        let (engine, _, _) = engine();

        // Register
        let user = engine
            .users()
            .register(" Ada@Example.COM ", "hunter2!", "ada", "lovelace", "")
            .await
            .unwrap();
        assert_eq!(user.mail().await.unwrap().unwrap(), "ada@example.com");
        assert_eq!(user.display_name().await.unwrap(), "Ada Lovelace");

        // Log in
        let verified = engine
            .users()
            .verify_credentials("ada@example.com", "hunter2!")
            .await
            .unwrap()
            .expect("login should succeed");
        assert_eq!(verified.id(), user.id());

        // Open a session and authenticate with its token
        let (session, token) = engine.sessions().open(verified.id()).await.unwrap();
        assert_eq!(session.user().await.unwrap(), Some(user.id()));

        let authenticated = engine
            .sessions()
            .authenticate(&token)
            .await
            .unwrap()
            .expect("token should authenticate");
        assert_eq!(authenticated.id(), session.id());

        // Log out
        engine.sessions().close(&session).await.unwrap();
        assert!(engine.sessions().authenticate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_game_workflow() {
        let (engine, _, _) = engine();

        let owner = engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();

        let game = engine.games().create(owner.id(), "Grand Arena").await.unwrap();
        assert_eq!(game.stage().await.unwrap(), Some(GameStage::Lobby));
        assert_eq!(game.owner().await.unwrap(), Some(owner.id()));

        // Lookups by name resolve through the instance registry to the
        // same cached handle
        let found = engine
            .games()
            .find_by_name("Grand Arena")
            .await
            .unwrap()
            .expect("game should be found");
        assert_eq!(found.id(), game.id());

        game.set_stage(GameStage::Active).await.unwrap();
        assert_eq!(found.stage().await.unwrap(), Some(GameStage::Active));

        game.set_name("Grander Arena").await.unwrap();
        assert!(engine.games().find_by_name("Grand Arena").await.unwrap().is_none());
        assert!(engine
            .games()
            .find_by_name("Grander Arena")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_does_not_authenticate() {
        let (engine, _, _) = engine();
        engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();

        assert!(engine
            .users()
            .verify_credentials("a@b.com", "not-the-password")
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .users()
            .verify_credentials("unknown@b.com", "hunter2!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_flush_all_forces_refetch_everywhere() {
        let (engine, shared, store) = engine();

        let user = engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();
        let game = engine.games().create(user.id(), "Arena").await.unwrap();
        let _ = user.mail().await.unwrap();
        let _ = game.name().await.unwrap();
        assert!(!shared.is_empty());

        engine.flush_all().await.unwrap();
        assert!(shared.is_empty());

        let reads_before = store.stats().find_one_calls;
        assert_eq!(user.mail().await.unwrap().unwrap(), "a@b.com");
        assert_eq!(game.name().await.unwrap().unwrap(), "Arena");
        assert_eq!(store.stats().find_one_calls, reads_before + 2);
    }

    #[tokio::test]
    async fn test_engine_without_shared_cache_still_serves() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            password_hash_cost: 1,
            redis_enable: false,
            ..EngineConfig::default()
        };
        let engine = Engine::with_backends(
            config,
            Arc::new(outpost::cache::DisabledSharedCache),
            store,
        )
        .unwrap();

        let user = engine
            .users()
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();
        assert_eq!(user.mail().await.unwrap().unwrap(), "a@b.com");
        assert!(engine.users().exists_by_id(&user.id()).await.unwrap());
    }
}

//! Per-type entity managers.
//!
//! An `EntityManager` is the facade over one entity type: it owns the
//! type's schema and instance registry and provides identity discovery,
//! row creation, and type-wide cache invalidation. Entity-specific
//! operations (credential checks, validated registration) live with the
//! concrete model types built on top of this.

use bson::Document;
use std::sync::Arc;
use std::time::Duration;

use super::handle::EntityHandle;
use super::instance::InstanceManager;
use crate::cache::key;
use crate::cache::SharedCache;
use crate::convert::FieldValue;
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;
use crate::schema::EntitySchema;
use crate::store::{id_filter, projection_of, AuthoritativeStore, FindSpec, ID_FIELD};

/// Facade over one entity type
pub struct EntityManager {
    schema: Arc<EntitySchema>,
    shared: Arc<dyn SharedCache>,
    store: Arc<dyn AuthoritativeStore>,
    shared_ttl: Duration,
    instances: InstanceManager,
}

impl EntityManager {
    /// Create a manager for an entity type
    pub fn new(
        schema: EntitySchema,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
        shared_ttl: Duration,
    ) -> Self {
        let schema = Arc::new(schema);
        let instances = InstanceManager::new(
            schema.clone(),
            shared.clone(),
            store.clone(),
            shared_ttl,
        );
        Self {
            schema,
            shared,
            store,
            shared_ttl,
            instances,
        }
    }

    /// Schema of the managed entity type
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// The type's instance registry
    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    pub(crate) fn shared(&self) -> &Arc<dyn SharedCache> {
        &self.shared
    }

    pub(crate) fn store(&self) -> &Arc<dyn AuthoritativeStore> {
        &self.store
    }

    pub(crate) fn shared_ttl(&self) -> Duration {
        self.shared_ttl
    }

    fn collection(&self) -> &str {
        self.schema.collection()
    }

    /// Handle for a row of this type. Construction is idempotent: repeated
    /// calls with one identity share their local cache.
    pub fn handle(&self, identity: Identity) -> EntityHandle {
        self.instances.obtain(identity)
    }

    /// Whether a row with this identity exists.
    ///
    /// The answer is cached in the shared tier under the type's existence
    /// key; on a miss the authoritative store is asked with an
    /// identity-only projection and the answer is written back best-effort.
    pub async fn exists_by_id(&self, identity: &Identity) -> EngineResult<bool> {
        let cache_key = key::exists_key(self.collection(), identity);

        if self.shared.ready().await {
            match self.shared.get(&cache_key).await {
                Ok(Some(flag)) => return Ok(flag == "1"),
                Ok(None) => {}
                Err(e) => {
                    log::debug!("Shared cache existence probe failed: {}", e);
                }
            }
        }

        let found = self
            .store
            .find_one(
                self.collection(),
                id_filter(identity),
                projection_of(std::iter::empty()),
            )
            .await?
            .is_some();

        if self.shared.ready().await {
            let flag = if found { "1" } else { "0" };
            if let Err(e) = self.shared.set_ex(&cache_key, flag, self.shared_ttl).await {
                log::debug!("Shared cache existence write-back failed: {}", e);
            }
        }

        Ok(found)
    }

    /// Find the row whose unique field holds the given value.
    ///
    /// Returns a handle from the instance registry, or `None` when no row
    /// matches.
    pub async fn find_by_unique_field(
        &self,
        field: &str,
        value: &FieldValue,
    ) -> EngineResult<Option<EntityHandle>> {
        let descriptor = self.schema.descriptor(field)?;
        let wire = descriptor.store_wire().encode(value).map_err(|e| {
            EngineError::Convert {
                entity: self.schema.entity_name().to_string(),
                identity: "-".to_string(),
                field: field.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut filter = Document::new();
        filter.insert(descriptor.store_name().to_string(), wire);
        let documents = self
            .store
            .find_many(
                self.collection(),
                filter,
                projection_of(std::iter::empty()),
                FindSpec::first(),
            )
            .await?;

        Ok(documents
            .first()
            .and_then(|document| document.get_object_id(ID_FIELD).ok())
            .map(|oid| self.handle(Identity::from(oid))))
    }

    /// Insert a new row with the given initial fields.
    ///
    /// The type-wide shared cache is pruned afterwards so stale existence
    /// probes cannot outlive the insert; the prune is best-effort and
    /// TTL-bounded on failure.
    pub async fn create(&self, fields: Vec<(&str, FieldValue)>) -> EngineResult<EntityHandle> {
        let mut document = Document::new();
        for (field, value) in &fields {
            let descriptor = self.schema.descriptor(field)?;
            let wire = descriptor.store_wire().encode(value).map_err(|e| {
                EngineError::Convert {
                    entity: self.schema.entity_name().to_string(),
                    identity: "-".to_string(),
                    field: field.to_string(),
                    message: e.to_string(),
                }
            })?;
            document.insert(descriptor.store_name().to_string(), wire);
        }

        let identity = self.store.insert_one(self.collection(), document).await?;
        log::debug!(
            "Created {} row {}",
            self.schema.entity_name(),
            identity
        );

        self.prune_shared().await;
        Ok(self.handle(identity))
    }

    /// Drop every cached trace of this entity type: all shared-cache keys
    /// under the type's wildcard and all registered handles, purging their
    /// local caches.
    pub async fn flush(&self) -> EngineResult<()> {
        self.prune_shared().await;
        self.instances.clear(true);
        Ok(())
    }

    /// Best-effort wildcard prune of the type's shared-cache keys
    async fn prune_shared(&self) {
        if !self.shared.ready().await {
            return;
        }
        let pattern = key::type_pattern(self.collection());
        match self.shared.keys(&pattern).await {
            Ok(keys) if !keys.is_empty() => {
                if let Err(e) = self.shared.del(&keys).await {
                    log::warn!("Shared cache prune failed for {}: {}", pattern, e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Shared cache enumeration failed for {}: {}", pattern, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::schema::FieldDescriptor;
    use crate::store::MemoryStore;

    fn game_manager() -> (EntityManager, Arc<MemoryStore>, Arc<MemorySharedCache>) {
        let schema = EntitySchema::builder("game", "game")
            .field("name", FieldDescriptor::new("name"))
            .field("stage", FieldDescriptor::new("stage"))
            .build()
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(MemorySharedCache::new());
        let manager = EntityManager::new(
            schema,
            shared.clone(),
            store.clone(),
            Duration::from_secs(60),
        );
        (manager, store, shared)
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let (manager, store, _) = game_manager();
        let handle = manager
            .create(vec![
                ("name", FieldValue::from("Arena")),
                ("stage", FieldValue::Int(0)),
            ])
            .await
            .unwrap();

        assert_eq!(store.count("game"), 1);
        assert_eq!(
            handle.get_field("name").await.unwrap(),
            Some(FieldValue::from("Arena"))
        );
    }

    #[tokio::test]
    async fn test_exists_probe_is_cached() {
        let (manager, store, shared) = game_manager();
        let handle = manager
            .create(vec![("name", FieldValue::from("Arena"))])
            .await
            .unwrap();
        let identity = handle.identity();

        assert!(manager.exists_by_id(&identity).await.unwrap());
        let store_reads = store.stats().find_one_calls;

        // Second probe is answered from the shared cache
        assert!(manager.exists_by_id(&identity).await.unwrap());
        assert_eq!(store.stats().find_one_calls, store_reads);

        let cache_key = key::exists_key("game", &identity);
        assert_eq!(shared.get(&cache_key).await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_exists_probe_caches_negative_answers() {
        let (manager, store, _) = game_manager();
        let missing = Identity::new();

        assert!(!manager.exists_by_id(&missing).await.unwrap());
        let store_reads = store.stats().find_one_calls;
        assert!(!manager.exists_by_id(&missing).await.unwrap());
        assert_eq!(store.stats().find_one_calls, store_reads);
    }

    #[tokio::test]
    async fn test_find_by_unique_field() {
        let (manager, _, _) = game_manager();
        let created = manager
            .create(vec![("name", FieldValue::from("Arena"))])
            .await
            .unwrap();

        let found = manager
            .find_by_unique_field("name", &FieldValue::from("Arena"))
            .await
            .unwrap()
            .expect("game should be found");
        assert_eq!(found.identity(), created.identity());

        let missing = manager
            .find_by_unique_field("name", &FieldValue::from("Nowhere"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_prunes_stale_existence_probes() {
        let (manager, _, shared) = game_manager();
        let missing = Identity::new();
        assert!(!manager.exists_by_id(&missing).await.unwrap());

        let cache_key = key::exists_key("game", &missing);
        assert_eq!(shared.get(&cache_key).await.unwrap(), Some("0".to_string()));

        let _ = manager
            .create(vec![("name", FieldValue::from("Arena"))])
            .await
            .unwrap();
        assert_eq!(shared.get(&cache_key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flush_empties_both_caches() {
        let (manager, _, shared) = game_manager();
        let handle = manager
            .create(vec![("name", FieldValue::from("Arena"))])
            .await
            .unwrap();
        let _ = handle.get_field("name").await.unwrap();
        assert!(!shared.is_empty());
        assert_eq!(handle.local_len(), 1);

        manager.flush().await.unwrap();
        assert!(shared.is_empty());
        assert_eq!(handle.local_len(), 0);
        assert!(manager.instances().is_empty());
    }
}

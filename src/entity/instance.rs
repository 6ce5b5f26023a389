//! Instance registry.
//!
//! One registry per entity type maps identities to live handles, so two
//! lookups of the same row share one local cache. Handle creation is
//! idempotent; entries hold strong references and live until the registry
//! is cleared.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::handle::EntityHandle;
use crate::cache::SharedCache;
use crate::identity::Identity;
use crate::schema::EntitySchema;
use crate::store::AuthoritativeStore;

/// Per-type registry ensuring identity uniqueness of handles
pub struct InstanceManager {
    schema: Arc<EntitySchema>,
    shared: Arc<dyn SharedCache>,
    store: Arc<dyn AuthoritativeStore>,
    shared_ttl: Duration,
    handles: DashMap<Identity, EntityHandle>,
}

impl InstanceManager {
    pub(crate) fn new(
        schema: Arc<EntitySchema>,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
        shared_ttl: Duration,
    ) -> Self {
        Self {
            schema,
            shared,
            store,
            shared_ttl,
            handles: DashMap::new(),
        }
    }

    /// Fetch the handle registered for this identity, constructing and
    /// registering one if none exists yet.
    pub fn obtain(&self, identity: Identity) -> EntityHandle {
        self.handles
            .entry(identity)
            .or_insert_with(|| {
                EntityHandle::new(
                    self.schema.clone(),
                    identity,
                    self.shared.clone(),
                    self.store.clone(),
                    self.shared_ttl,
                )
            })
            .clone()
    }

    /// Whether a handle is currently registered for this identity
    pub fn contains(&self, identity: &Identity) -> bool {
        self.handles.contains_key(identity)
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every registered handle. When `purge_local_caches` is set,
    /// handles already handed out also have their local caches emptied, so
    /// their next read re-fetches from the lower tiers.
    pub fn clear(&self, purge_local_caches: bool) {
        if purge_local_caches {
            for entry in self.handles.iter() {
                entry.value().purge_local();
            }
        }
        self.handles.clear();
    }
}

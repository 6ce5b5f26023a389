//! Entity handles.
//!
//! A handle is bound to one (entity type, identity) pair and mediates all
//! tier access for that row:
//!
//! - Reads consult the local cache, then the shared cache, then the
//!   authoritative store, backfilling each higher tier on a miss.
//! - Writes go through to the authoritative store first; caches are only
//!   updated after the store acknowledges.
//! - The shared cache is advisory: its failures are logged and treated as
//!   misses. Authoritative-store failures are hard errors.
//!
//! Handles are cheap to clone; clones share one local cache, so a value
//! written through any clone is immediately visible to the others.

use bson::Document;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::key;
use crate::cache::{LocalCache, SharedCache};
use crate::convert::{ConvertError, FieldValue};
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;
use crate::schema::EntitySchema;
use crate::store::{id_filter, projection_of, AuthoritativeStore, UpdateSpec};

struct HandleInner {
    schema: Arc<EntitySchema>,
    identity: Identity,
    local: LocalCache,
    shared: Arc<dyn SharedCache>,
    store: Arc<dyn AuthoritativeStore>,
    shared_ttl: Duration,
}

/// Live object mediating tier access for one row of one entity type
#[derive(Clone)]
pub struct EntityHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("identity", &self.inner.identity)
            .finish()
    }
}

impl EntityHandle {
    pub(crate) fn new(
        schema: Arc<EntitySchema>,
        identity: Identity,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
        shared_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                schema,
                identity,
                local: LocalCache::new(),
                shared,
                store,
                shared_ttl,
            }),
        }
    }

    /// Identity of the row this handle is bound to
    pub fn identity(&self) -> Identity {
        self.inner.identity
    }

    /// Schema of the entity type this handle belongs to
    pub fn schema(&self) -> &EntitySchema {
        &self.inner.schema
    }

    fn collection(&self) -> &str {
        self.inner.schema.collection()
    }

    fn convert_error(&self, field: &str, err: ConvertError) -> EngineError {
        EngineError::Convert {
            entity: self.inner.schema.entity_name().to_string(),
            identity: self.inner.identity.to_hex(),
            field: field.to_string(),
            message: err.to_string(),
        }
    }

    /// Read one field through the tiers. `None` means the row or the field
    /// is absent from the authoritative store.
    pub async fn get_field(&self, field: &str) -> EngineResult<Option<FieldValue>> {
        let descriptor = self.inner.schema.descriptor(field)?;

        if descriptor.local_enabled() {
            if let Some(value) = self.inner.local.get(field) {
                return Ok(Some(value));
            }
        }

        if descriptor.shared_enabled() && self.inner.shared.ready().await {
            let cache_key = key::field_key(self.collection(), &self.inner.identity, field);
            match self.inner.shared.get(&cache_key).await {
                Ok(Some(wire)) => {
                    let value = descriptor
                        .shared_wire()
                        .decode(&wire)
                        .map_err(|e| self.convert_error(field, e))?;
                    if descriptor.local_enabled() {
                        self.inner.local.set(field, value.clone());
                    }
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => {
                    log::debug!("Shared cache read failed for {}: {}", cache_key, e);
                }
            }
        }

        let mut fetched = self.fetch_from_store(&[field]).await?;
        Ok(fetched.shift_remove(field))
    }

    /// Read several fields, coalescing tier round-trips: local hits resolve
    /// synchronously, the rest go out as one `mget`, and what remains is
    /// fetched with a single projection from the authoritative store.
    ///
    /// The result contains an entry per field that resolved to a value, in
    /// the order the fields were requested; absent fields are omitted.
    pub async fn get_fields(&self, fields: &[&str]) -> EngineResult<IndexMap<String, FieldValue>> {
        let mut resolved: IndexMap<String, FieldValue> = IndexMap::new();
        let mut remaining: Vec<&str> = Vec::new();

        for &field in fields {
            let descriptor = self.inner.schema.descriptor(field)?;
            if resolved.contains_key(field) || remaining.contains(&field) {
                continue;
            }
            if descriptor.local_enabled() {
                if let Some(value) = self.inner.local.get(field) {
                    resolved.insert(field.to_string(), value);
                    continue;
                }
            }
            remaining.push(field);
        }

        if !remaining.is_empty() && self.inner.shared.ready().await {
            let shared_fields: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|f| {
                    self.inner
                        .schema
                        .descriptor(f)
                        .map(|d| d.shared_enabled())
                        .unwrap_or(false)
                })
                .collect();

            if !shared_fields.is_empty() {
                let keys: Vec<String> = shared_fields
                    .iter()
                    .map(|f| key::field_key(self.collection(), &self.inner.identity, f))
                    .collect();

                match self.inner.shared.mget(&keys).await {
                    Ok(wires) => {
                        for (&field, wire) in shared_fields.iter().zip(wires) {
                            let Some(wire) = wire else { continue };
                            let descriptor = self.inner.schema.descriptor(field)?;
                            let value = descriptor
                                .shared_wire()
                                .decode(&wire)
                                .map_err(|e| self.convert_error(field, e))?;
                            if descriptor.local_enabled() {
                                self.inner.local.set(field, value.clone());
                            }
                            resolved.insert(field.to_string(), value);
                            remaining.retain(|&f| f != field);
                        }
                    }
                    Err(e) => {
                        log::debug!(
                            "Shared cache batch read failed for {}:{}: {}",
                            self.collection(),
                            self.inner.identity,
                            e
                        );
                    }
                }
            }
        }

        if !remaining.is_empty() {
            let fetched = self.fetch_from_store(&remaining).await?;
            resolved.extend(fetched);
        }

        let mut out = IndexMap::with_capacity(resolved.len());
        for &field in fields {
            if let Some(value) = resolved.get(field) {
                out.entry(field.to_string()).or_insert_with(|| value.clone());
            }
        }
        Ok(out)
    }

    /// One projection read from the authoritative store, backfilling the
    /// shared cache and then the local cache with every fetched value.
    async fn fetch_from_store(&self, fields: &[&str]) -> EngineResult<IndexMap<String, FieldValue>> {
        let mut store_names = Vec::with_capacity(fields.len());
        for &field in fields {
            store_names.push(self.inner.schema.descriptor(field)?.store_name());
        }

        let document = self
            .inner
            .store
            .find_one(
                self.collection(),
                id_filter(&self.inner.identity),
                projection_of(store_names.iter().copied()),
            )
            .await?;

        let mut out = IndexMap::new();
        let Some(document) = document else {
            return Ok(out);
        };

        let mut shared_backfill: Vec<(String, String)> = Vec::new();
        let mut local_backfill: Vec<(String, FieldValue)> = Vec::new();

        for &field in fields {
            let descriptor = self.inner.schema.descriptor(field)?;
            let Some(wire) = document.get(descriptor.store_name()) else {
                continue;
            };
            let value = descriptor
                .store_wire()
                .decode(wire)
                .map_err(|e| self.convert_error(field, e))?;

            if descriptor.shared_enabled() {
                let encoded = descriptor
                    .shared_wire()
                    .encode(&value)
                    .map_err(|e| self.convert_error(field, e))?;
                shared_backfill.push((
                    key::field_key(self.collection(), &self.inner.identity, field),
                    encoded,
                ));
            }
            if descriptor.local_enabled() {
                local_backfill.push((field.to_string(), value.clone()));
            }
            out.insert(field.to_string(), value);
        }

        // Shared backfill goes first: a fetch cancelled between the two
        // writes must never leave a value that exists only locally.
        if !shared_backfill.is_empty() && self.inner.shared.ready().await {
            let result = if let [(cache_key, wire)] = shared_backfill.as_slice() {
                self.inner
                    .shared
                    .set_ex(cache_key, wire, self.inner.shared_ttl)
                    .await
            } else {
                self.inner
                    .shared
                    .mset_ex(&shared_backfill, self.inner.shared_ttl)
                    .await
            };
            if let Err(e) = result {
                log::debug!(
                    "Shared cache backfill failed for {}:{}: {}",
                    self.collection(),
                    self.inner.identity,
                    e
                );
            }
        }
        self.inner.local.set_many(local_backfill);

        Ok(out)
    }

    /// Write one field through to the authoritative store, then update the
    /// caches the field participates in.
    pub async fn set_field(&self, field: &str, value: FieldValue) -> EngineResult<()> {
        self.set_fields(vec![(field, value)]).await
    }

    /// Write several fields as one authoritative-store update. On success
    /// the local cache is updated and the shared cache receives all values
    /// in one batched write; a shared-cache failure is logged but does not
    /// fail the call.
    pub async fn set_fields(&self, entries: Vec<(&str, FieldValue)>) -> EngineResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // Run every codec before any I/O so a converter error can never
        // strand an acknowledged store write without its cache updates.
        let mut set_doc = Document::new();
        let mut shared_writes: Vec<(String, String)> = Vec::new();
        let mut local_writes: Vec<(String, FieldValue)> = Vec::new();

        for (field, value) in &entries {
            let descriptor = self.inner.schema.descriptor(field)?;
            let store_wire = descriptor
                .store_wire()
                .encode(value)
                .map_err(|e| self.convert_error(field, e))?;
            set_doc.insert(descriptor.store_name().to_string(), store_wire);

            if descriptor.shared_enabled() {
                let wire = descriptor
                    .shared_wire()
                    .encode(value)
                    .map_err(|e| self.convert_error(field, e))?;
                shared_writes.push((
                    key::field_key(self.collection(), &self.inner.identity, field),
                    wire,
                ));
            }
            if descriptor.local_enabled() {
                local_writes.push((field.to_string(), value.clone()));
            }
        }

        self.inner
            .store
            .update_one(
                self.collection(),
                id_filter(&self.inner.identity),
                UpdateSpec::set(set_doc),
            )
            .await?;

        self.inner.local.set_many(local_writes);

        if !shared_writes.is_empty() && self.inner.shared.ready().await {
            let result = if let [(cache_key, wire)] = shared_writes.as_slice() {
                self.inner
                    .shared
                    .set_ex(cache_key, wire, self.inner.shared_ttl)
                    .await
            } else {
                self.inner
                    .shared
                    .mset_ex(&shared_writes, self.inner.shared_ttl)
                    .await
            };
            if let Err(e) = result {
                log::warn!(
                    "Shared cache write-through failed for {}:{}: {}",
                    self.collection(),
                    self.inner.identity,
                    e
                );
            }
        }

        Ok(())
    }

    /// Whether the field currently holds a value, consulting the cheapest
    /// tier that can answer.
    pub async fn has_field(&self, field: &str) -> EngineResult<bool> {
        let descriptor = self.inner.schema.descriptor(field)?;

        if descriptor.local_enabled() && self.inner.local.has(field) {
            return Ok(true);
        }

        if descriptor.shared_enabled() && self.inner.shared.ready().await {
            let cache_key = key::field_key(self.collection(), &self.inner.identity, field);
            match self.inner.shared.exists(&[cache_key]).await {
                Ok(count) if count > 0 => return Ok(true),
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Shared cache exists check failed: {}", e);
                }
            }
        }

        let document = self
            .inner
            .store
            .find_one(
                self.collection(),
                id_filter(&self.inner.identity),
                projection_of([descriptor.store_name()]),
            )
            .await?;

        Ok(document
            .map(|doc| doc.contains_key(descriptor.store_name()))
            .unwrap_or(false))
    }

    /// Remove one field from the row and every cache tier
    pub async fn flush_field(&self, field: &str) -> EngineResult<()> {
        let descriptor = self.inner.schema.descriptor(field)?;

        self.inner
            .store
            .update_one(
                self.collection(),
                id_filter(&self.inner.identity),
                UpdateSpec::unset(descriptor.store_name()),
            )
            .await?;

        if descriptor.shared_enabled() && self.inner.shared.ready().await {
            let cache_key = key::field_key(self.collection(), &self.inner.identity, field);
            if let Err(e) = self.inner.shared.del(&[cache_key]).await {
                log::warn!("Shared cache prune failed for field {}: {}", field, e);
            }
        }

        self.inner.local.remove(field);
        Ok(())
    }

    /// Delete the row from the authoritative store and prune every cache
    /// key belonging to it
    pub async fn flush(&self) -> EngineResult<()> {
        self.inner
            .store
            .delete_one(self.collection(), id_filter(&self.inner.identity))
            .await?;

        if self.inner.shared.ready().await {
            let pattern = key::row_pattern(self.collection(), &self.inner.identity);
            match self.inner.shared.keys(&pattern).await {
                Ok(keys) if !keys.is_empty() => {
                    if let Err(e) = self.inner.shared.del(&keys).await {
                        log::warn!("Shared cache prune failed for {}: {}", pattern, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Shared cache enumeration failed for {}: {}", pattern, e);
                }
            }
        }

        self.inner.local.clear();
        Ok(())
    }

    /// Empty this handle's local cache without touching the other tiers
    pub(crate) fn purge_local(&self) {
        self.inner.local.clear();
    }

    #[cfg(test)]
    pub(crate) fn local_len(&self) -> usize {
        self.inner.local.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::convert::SharedCodec;
    use crate::schema::FieldDescriptor;
    use crate::store::MemoryStore;
    use bson::doc;

    fn test_schema() -> Arc<EntitySchema> {
        Arc::new(
            EntitySchema::builder("user", "user")
                .field("mail", FieldDescriptor::new("mail"))
                .field(
                    "password_hash",
                    FieldDescriptor::new("password_hash").uncached(),
                )
                .field(
                    "premium",
                    FieldDescriptor::new("premium").shared_codec(SharedCodec::boolean()),
                )
                .field("nickname", FieldDescriptor::new("nickname").shared_cache(false))
                .build()
                .unwrap(),
        )
    }

    async fn seeded() -> (EntityHandle, Arc<MemoryStore>, Arc<MemorySharedCache>) {
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(MemorySharedCache::new());

        let identity = store
            .insert_one(
                "user",
                doc! {
                    "mail": "a@b.com",
                    "password_hash": "H",
                    "premium": true,
                    "nickname": "ada",
                },
            )
            .await
            .unwrap();

        let handle = EntityHandle::new(
            test_schema(),
            identity,
            shared.clone(),
            store.clone(),
            Duration::from_secs(60),
        );
        (handle, store, shared)
    }

    #[tokio::test]
    async fn test_cold_read_falls_through_and_backfills() {
        let (handle, store, shared) = seeded().await;

        let value = handle.get_field("mail").await.unwrap();
        assert_eq!(value, Some(FieldValue::from("a@b.com")));
        assert_eq!(store.stats().find_one_calls, 1);

        // Backfilled into both caches
        let cache_key = key::field_key("user", &handle.identity(), "mail");
        assert_eq!(shared.get(&cache_key).await.unwrap(), Some("a@b.com".to_string()));

        // Warm read is served locally
        let value = handle.get_field("mail").await.unwrap();
        assert_eq!(value, Some(FieldValue::from("a@b.com")));
        assert_eq!(store.stats().find_one_calls, 1);
    }

    #[tokio::test]
    async fn test_shared_hit_skips_the_store() {
        let (handle, store, shared) = seeded().await;
        let cache_key = key::field_key("user", &handle.identity(), "premium");
        shared
            .set_ex(&cache_key, "0", Duration::from_secs(60))
            .await
            .unwrap();

        let value = handle.get_field("premium").await.unwrap();
        assert_eq!(value, Some(FieldValue::Bool(false)));
        assert_eq!(store.stats().find_one_calls, 0);
    }

    #[tokio::test]
    async fn test_write_through_updates_caches() {
        let (handle, store, shared) = seeded().await;

        handle
            .set_field("mail", FieldValue::from("new@b.com"))
            .await
            .unwrap();
        assert_eq!(store.stats().updates, 1);

        // Read-your-writes without further store traffic
        let value = handle.get_field("mail").await.unwrap();
        assert_eq!(value, Some(FieldValue::from("new@b.com")));
        assert_eq!(store.stats().find_one_calls, 0);

        let cache_key = key::field_key("user", &handle.identity(), "mail");
        assert_eq!(
            shared.get(&cache_key).await.unwrap(),
            Some("new@b.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_uncached_field_never_touches_cache_tiers() {
        let (handle, store, shared) = seeded().await;

        let value = handle.get_field("password_hash").await.unwrap();
        assert_eq!(value, Some(FieldValue::from("H")));
        assert_eq!(handle.local_len(), 0);
        assert!(shared.is_empty());

        // Every read goes to the store
        let _ = handle.get_field("password_hash").await.unwrap();
        assert_eq!(store.stats().find_one_calls, 2);
    }

    #[tokio::test]
    async fn test_unready_shared_cache_is_skipped_entirely() {
        let (handle, store, shared) = seeded().await;
        shared.set_ready(false);

        let value = handle.get_field("mail").await.unwrap();
        assert_eq!(value, Some(FieldValue::from("a@b.com")));
        assert_eq!(store.stats().find_one_calls, 1);

        let stats = shared.stats();
        assert_eq!(stats.gets, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.msets, 0);
    }

    #[tokio::test]
    async fn test_absent_row_reads_as_none() {
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(MemorySharedCache::new());
        let handle = EntityHandle::new(
            test_schema(),
            Identity::new(),
            shared,
            store,
            Duration::from_secs(60),
        );

        assert_eq!(handle.get_field("mail").await.unwrap(), None);
        assert!(!handle.has_field("mail").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_field_aborts() {
        let (handle, _, _) = seeded().await;
        let err = handle.get_field("shoe_size").await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownField { .. }));

        let err = handle
            .set_field("shoe_size", FieldValue::Int(44))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn test_get_fields_coalesces_round_trips() {
        let (handle, store, shared) = seeded().await;

        let values = handle
            .get_fields(&["mail", "premium", "nickname"])
            .await
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["mail"], FieldValue::from("a@b.com"));
        assert_eq!(values["premium"], FieldValue::Bool(true));
        assert_eq!(values["nickname"], FieldValue::from("ada"));

        // One batched cache read (nickname is shared-disabled, so two keys),
        // one projection read for everything
        assert_eq!(shared.stats().mgets, 1);
        assert_eq!(store.stats().find_one_calls, 1);
    }

    #[tokio::test]
    async fn test_flush_field() {
        let (handle, store, shared) = seeded().await;
        let _ = handle.get_field("mail").await.unwrap();

        handle.flush_field("mail").await.unwrap();
        assert_eq!(handle.local_len(), 0);
        let cache_key = key::field_key("user", &handle.identity(), "mail");
        assert_eq!(shared.get(&cache_key).await.unwrap(), None);
        assert_eq!(handle.get_field("mail").await.unwrap(), None);
        assert_eq!(store.stats().updates, 1);
    }

    #[tokio::test]
    async fn test_flush_removes_row_and_cache_keys() {
        let (handle, store, shared) = seeded().await;
        let _ = handle.get_fields(&["mail", "premium"]).await.unwrap();
        assert!(!shared.is_empty());

        handle.flush().await.unwrap();
        assert_eq!(store.count("user"), 0);
        assert!(shared.is_empty());
        assert_eq!(handle.local_len(), 0);
        assert_eq!(handle.get_field("mail").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_has_field() {
        let (handle, _, _) = seeded().await;
        assert!(handle.has_field("mail").await.unwrap());

        handle.flush_field("nickname").await.unwrap();
        assert!(!handle.has_field("nickname").await.unwrap());
    }
}

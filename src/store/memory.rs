//! In-memory mock of the authoritative store.
//!
//! Supports the slice of document-store behaviour the engine relies on:
//! equality filters, `$set`/`$unset` updates, projections, and single-field
//! sorting. Keeps per-operation counters and records the projection of the
//! most recent read so tests can assert projection minimality.

use async_trait::async_trait;
use bson::{Bson, Document};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AuthoritativeStore, FindSpec, UpdateSpec, ID_FIELD};
use crate::error::EngineResult;
use crate::identity::Identity;

/// Snapshot of the operation counters of a `MemoryStore`
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// `find_one` calls issued
    pub find_one_calls: u64,
    /// `find_many` calls issued
    pub find_many_calls: u64,
    /// `insert_one` calls issued
    pub inserts: u64,
    /// `update_one` calls issued
    pub updates: u64,
    /// `delete_one` calls issued
    pub deletes: u64,
}

/// Mock authoritative store holding documents in process memory
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    find_one_calls: AtomicU64,
    find_many_calls: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    last_projection: Mutex<Option<Vec<String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the operation counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            find_one_calls: self.find_one_calls.load(Ordering::Relaxed),
            find_many_calls: self.find_many_calls.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Field names of the projection used by the most recent read
    pub fn last_projection(&self) -> Option<Vec<String>> {
        self.last_projection.lock().clone()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn record_projection(&self, projection: &Document) {
        let mut names: Vec<String> = projection.keys().cloned().collect();
        names.sort();
        *self.last_projection.lock() = Some(names);
    }

    fn matches(document: &Document, filter: &Document) -> bool {
        filter
            .iter()
            .all(|(key, value)| document.get(key) == Some(value))
    }

    fn project(document: &Document, projection: &Document) -> Document {
        let mut projected = Document::new();
        for key in projection.keys() {
            if let Some(value) = document.get(key) {
                projected.insert(key.clone(), value.clone());
            }
        }
        projected
    }

    fn compare(a: &Bson, b: &Bson) -> CmpOrdering {
        match (a, b) {
            (Bson::String(x), Bson::String(y)) => x.cmp(y),
            (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
            (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
            (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
            _ => {
                let x = numeric(a);
                let y = numeric(b);
                match (x, y) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
                    _ => CmpOrdering::Equal,
                }
            }
        }
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

#[async_trait]
impl AuthoritativeStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
    ) -> EngineResult<Option<Document>> {
        self.find_one_calls.fetch_add(1, Ordering::Relaxed);
        self.record_projection(&projection);

        let collections = self.collections.lock();
        let document = collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| Self::matches(doc, &filter)))
            .map(|doc| Self::project(doc, &projection));
        Ok(document)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        spec: FindSpec,
    ) -> EngineResult<Vec<Document>> {
        self.find_many_calls.fetch_add(1, Ordering::Relaxed);
        self.record_projection(&projection);

        let collections = self.collections.lock();
        let mut matched: Vec<&Document> = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| Self::matches(doc, &filter)).collect())
            .unwrap_or_default();

        if let Some(sort_field) = &spec.sort_field {
            matched.sort_by(|a, b| {
                let ordering = Self::compare(
                    a.get(sort_field).unwrap_or(&Bson::Null),
                    b.get(sort_field).unwrap_or(&Bson::Null),
                );
                if spec.sort_ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(limit) = spec.limit {
            matched.truncate(limit.max(0) as usize);
        }

        Ok(matched
            .into_iter()
            .map(|doc| Self::project(doc, &projection))
            .collect())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> EngineResult<Identity> {
        self.inserts.fetch_add(1, Ordering::Relaxed);

        let identity = match document.get(ID_FIELD).and_then(Bson::as_object_id) {
            Some(oid) => Identity::from(oid),
            None => {
                let identity = Identity::new();
                document.insert(ID_FIELD, identity.to_bson());
                identity
            }
        };

        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(identity)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateSpec,
    ) -> EngineResult<()> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        if update.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.lock();
        if let Some(document) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| Self::matches(doc, &filter)))
        {
            for (key, value) in &update.set {
                document.insert(key.clone(), value.clone());
            }
            for key in &update.unset {
                document.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> EngineResult<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let mut collections = self.collections.lock();
        if let Some(docs) = collections.get_mut(collection) {
            if let Some(position) = docs.iter().position(|doc| Self::matches(doc, &filter)) {
                docs.remove(position);
            }
        }
        Ok(())
    }
}

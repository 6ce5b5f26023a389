//! Authoritative store abstraction.
//!
//! The authoritative store is a document database: one collection per
//! entity type, one document per row. The engine only ever touches it
//! through this module's trait, using equality filters, `$set`/`$unset`
//! updates, and explicit projections that always include the identity
//! field.

use async_trait::async_trait;
use bson::Document;

use crate::error::EngineResult;
use crate::identity::Identity;

pub mod memory;
pub mod mongo;

pub use memory::{MemoryStore, StoreStats};
pub use mongo::MongoStore;

/// Name of the identity field in every collection
pub const ID_FIELD: &str = "_id";

/// Options for a multi-document read
#[derive(Debug, Clone, Default)]
pub struct FindSpec {
    /// Maximum number of documents to return
    pub limit: Option<i64>,
    /// Store-level field to sort on
    pub sort_field: Option<String>,
    /// Sort direction; ascending when true
    pub sort_ascending: bool,
}

impl FindSpec {
    /// Limit the result to the first matching document
    pub fn first() -> Self {
        Self {
            limit: Some(1),
            ..Self::default()
        }
    }

    /// Sort on a store-level field
    pub fn sorted(field: &str, ascending: bool) -> Self {
        Self {
            limit: None,
            sort_field: Some(field.to_string()),
            sort_ascending: ascending,
        }
    }
}

/// A single-document update: fields to `$set` and fields to `$unset`
#[derive(Debug, Clone, Default)]
pub struct UpdateSpec {
    /// Store-level field names and their new wire values
    pub set: Document,
    /// Store-level field names to remove from the document
    pub unset: Vec<String>,
}

impl UpdateSpec {
    /// Update that sets the given fields
    pub fn set(fields: Document) -> Self {
        Self {
            set: fields,
            unset: Vec::new(),
        }
    }

    /// Update that removes one field
    pub fn unset(field: &str) -> Self {
        Self {
            set: Document::new(),
            unset: vec![field.to_string()],
        }
    }

    /// Whether the update would change nothing
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Render as a document-store update document
    pub fn into_document(self) -> Document {
        let mut update = Document::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set);
        }
        if !self.unset.is_empty() {
            let mut unset = Document::new();
            for field in self.unset {
                unset.insert(field, "");
            }
            update.insert("$unset", unset);
        }
        update
    }
}

/// Build a projection over the given store-level field names.
///
/// The identity field is always part of the projection, whether listed or
/// not.
pub fn projection_of<'a, I>(store_names: I) -> Document
where
    I: IntoIterator<Item = &'a str>,
{
    let mut projection = Document::new();
    projection.insert(ID_FIELD, 1_i32);
    for name in store_names {
        if name != ID_FIELD {
            projection.insert(name, 1_i32);
        }
    }
    projection
}

/// Filter selecting one row by identity
pub fn id_filter(identity: &Identity) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD, identity.to_bson());
    filter
}

/// Document-store operations used by the engine.
///
/// Implementations are safe for concurrent use and shared process-wide.
/// Failures are infrastructure errors: they propagate to the caller as hard
/// failures, never as misses.
#[async_trait]
pub trait AuthoritativeStore: Send + Sync {
    /// Fetch one document matching the filter, reduced to the projection
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
    ) -> EngineResult<Option<Document>>;

    /// Fetch documents matching the filter, reduced to the projection
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        spec: FindSpec,
    ) -> EngineResult<Vec<Document>>;

    /// Insert a document, returning its identity
    async fn insert_one(&self, collection: &str, document: Document) -> EngineResult<Identity>;

    /// Apply a `$set`/`$unset` update to the first document matching the
    /// filter. Updating a document that does not exist is not an error.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateSpec,
    ) -> EngineResult<()>;

    /// Delete the first document matching the filter
    async fn delete_one(&self, collection: &str, filter: Document) -> EngineResult<()>;

    /// Release any held connections. The default implementation does
    /// nothing.
    async fn close(&self) {}
}

//! Per-handle local cache.
//!
//! An insertion-ordered map from logical field name to in-memory value, one
//! per live entity handle. No TTL and no eviction: entries live until the
//! field is flushed, the handle is flushed, or the instance registry purges
//! it. Values are stored in their in-memory form; tier codecs never run
//! here.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::convert::FieldValue;

/// Local field-value cache owned by one entity handle.
///
/// All operations are synchronous and never block on I/O. The inner mutex
/// only guards the map itself, so no two operations on the same handle
/// mutate it simultaneously.
#[derive(Debug, Default)]
pub struct LocalCache {
    fields: Mutex<IndexMap<String, FieldValue>>,
}

impl LocalCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a value is cached for this field
    pub fn has(&self, field: &str) -> bool {
        self.fields.lock().contains_key(field)
    }

    /// Fetch the cached value for this field, if any
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.fields.lock().get(field).cloned()
    }

    /// Cache a value for this field
    pub fn set(&self, field: &str, value: FieldValue) {
        self.fields.lock().insert(field.to_string(), value);
    }

    /// Cache several values at once
    pub fn set_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let mut fields = self.fields.lock();
        for (field, value) in entries {
            fields.insert(field, value);
        }
    }

    /// Remove one field from the cache
    pub fn remove(&self, field: &str) {
        self.fields.lock().shift_remove(field);
    }

    /// Empty the cache
    pub fn clear(&self) {
        self.fields.lock().clear();
    }

    /// Number of cached fields
    pub fn len(&self) -> usize {
        self.fields.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.fields.lock().is_empty()
    }
}

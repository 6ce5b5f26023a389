//! Shared-cache key layout.
//!
//! Every key the engine writes to the shared cache follows one schema:
//!
//! | Purpose | Key |
//! |---|---|
//! | Field value | `model:<collection>:<identityHex>:<logicalField>` |
//! | Existence probe | `model:<collection>:<identityHex>:exists` |
//! | Per-row wildcard | `model:<collection>:<identityHex>:*` |
//! | Per-type wildcard | `model:<collection>:*` |

use crate::identity::Identity;

/// Namespace prefix for all engine-owned keys
const PREFIX: &str = "model";

/// Key suffix of the identity-existence probe
const EXISTS_SUFFIX: &str = "exists";

/// Builder for consistent `:`-joined cache keys
pub struct KeyBuilder {
    parts: Vec<String>,
}

impl KeyBuilder {
    /// Start a key in the engine namespace
    pub fn new() -> Self {
        Self {
            parts: vec![PREFIX.to_string()],
        }
    }

    /// Add a part to the key
    pub fn part<T: ToString>(mut self, part: T) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Build the final key
    pub fn build(self) -> String {
        self.parts.join(":")
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Key holding one field value of one row
pub fn field_key(collection: &str, identity: &Identity, field: &str) -> String {
    KeyBuilder::new()
        .part(collection)
        .part(identity.to_hex())
        .part(field)
        .build()
}

/// Key holding the identity-existence probe of one row
pub fn exists_key(collection: &str, identity: &Identity) -> String {
    KeyBuilder::new()
        .part(collection)
        .part(identity.to_hex())
        .part(EXISTS_SUFFIX)
        .build()
}

/// Wildcard matching every key of one row
pub fn row_pattern(collection: &str, identity: &Identity) -> String {
    KeyBuilder::new()
        .part(collection)
        .part(identity.to_hex())
        .part("*")
        .build()
}

/// Wildcard matching every key of one entity type
pub fn type_pattern(collection: &str) -> String {
    KeyBuilder::new().part(collection).part("*").build()
}

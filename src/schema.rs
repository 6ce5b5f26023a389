//! Per-entity field schemas.
//!
//! A schema binds an entity type to its collection in the authoritative
//! store and declares, per logical field: the store-level field name, which
//! cache tiers the field participates in, and the codec pair for each tier
//! boundary. Schemas are built once at startup and immutable afterwards.

use indexmap::IndexMap;

use crate::convert::{SharedCodec, StoreCodec};
use crate::error::{EngineError, EngineResult};
use crate::store::ID_FIELD;

/// Declaration of one logical field.
///
/// Cache participation left undeclared falls back to the schema-wide
/// defaults when the schema is built. Codecs default to the string codec on
/// the shared wire and the natural BSON mapping on the store wire.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    store_name: String,
    local_enabled: Option<bool>,
    shared_enabled: Option<bool>,
    shared_codec: SharedCodec,
    store_codec: StoreCodec,
}

impl FieldDescriptor {
    /// Declare a field stored under the given store-level name
    pub fn new(store_name: &str) -> Self {
        Self {
            store_name: store_name.to_string(),
            local_enabled: None,
            shared_enabled: None,
            shared_codec: SharedCodec::string(),
            store_codec: StoreCodec::native(),
        }
    }

    /// Override local-cache participation
    pub fn local_cache(mut self, enabled: bool) -> Self {
        self.local_enabled = Some(enabled);
        self
    }

    /// Override shared-cache participation
    pub fn shared_cache(mut self, enabled: bool) -> Self {
        self.shared_enabled = Some(enabled);
        self
    }

    /// Exclude the field from both cache tiers. Every read and write goes
    /// straight to the authoritative store.
    pub fn uncached(self) -> Self {
        self.local_cache(false).shared_cache(false)
    }

    /// Use a specific codec on the shared-cache wire
    pub fn shared_codec(mut self, codec: SharedCodec) -> Self {
        self.shared_codec = codec;
        self
    }

    /// Use a specific codec on the authoritative wire
    pub fn store_codec(mut self, codec: StoreCodec) -> Self {
        self.store_codec = codec;
        self
    }

    /// Store-level field name
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Whether reads and writes populate the per-handle local cache
    pub fn local_enabled(&self) -> bool {
        self.local_enabled.unwrap_or(true)
    }

    /// Whether reads and writes populate the shared cache
    pub fn shared_enabled(&self) -> bool {
        self.shared_enabled.unwrap_or(true)
    }

    /// Codec for the shared-cache wire
    pub fn shared_wire(&self) -> &SharedCodec {
        &self.shared_codec
    }

    /// Codec for the authoritative wire
    pub fn store_wire(&self) -> &StoreCodec {
        &self.store_codec
    }
}

/// Immutable field schema of one entity type
#[derive(Debug)]
pub struct EntitySchema {
    entity_name: String,
    collection: String,
    fields: IndexMap<String, FieldDescriptor>,
}

impl EntitySchema {
    /// Start building a schema for an entity type backed by a collection
    pub fn builder(entity_name: &str, collection: &str) -> SchemaBuilder {
        SchemaBuilder {
            entity_name: entity_name.to_string(),
            collection: collection.to_string(),
            default_local: true,
            default_shared: true,
            fields: IndexMap::new(),
            error: None,
        }
    }

    /// Entity type name (used in errors and logs)
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Collection name in the authoritative store
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Look up the descriptor of a logical field.
    ///
    /// An unknown field is a programmer error and aborts the operation.
    pub fn descriptor(&self, field: &str) -> EngineResult<&FieldDescriptor> {
        self.fields.get(field).ok_or_else(|| EngineError::UnknownField {
            entity: self.entity_name.clone(),
            field: field.to_string(),
        })
    }

    /// Whether the schema declares a logical field
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared logical field names, in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for `EntitySchema`
pub struct SchemaBuilder {
    entity_name: String,
    collection: String,
    default_local: bool,
    default_shared: bool,
    fields: IndexMap<String, FieldDescriptor>,
    error: Option<String>,
}

impl SchemaBuilder {
    /// Cache-participation defaults for fields that do not override them
    pub fn cache_defaults(mut self, local: bool, shared: bool) -> Self {
        self.default_local = local;
        self.default_shared = shared;
        self
    }

    /// Declare a logical field
    pub fn field(mut self, logical_name: &str, descriptor: FieldDescriptor) -> Self {
        if self.error.is_some() {
            return self;
        }
        if logical_name.is_empty() {
            self.error = Some("logical field name must not be empty".to_string());
            return self;
        }
        if descriptor.store_name.is_empty() {
            self.error = Some(format!("field `{}` has an empty store name", logical_name));
            return self;
        }
        if descriptor.store_name == ID_FIELD {
            self.error = Some(format!(
                "field `{}` maps to the identity field `{}`",
                logical_name, ID_FIELD
            ));
            return self;
        }
        if self
            .fields
            .values()
            .any(|existing| existing.store_name == descriptor.store_name)
        {
            self.error = Some(format!(
                "store name `{}` is bound twice",
                descriptor.store_name
            ));
            return self;
        }
        if self
            .fields
            .insert(logical_name.to_string(), descriptor)
            .is_some()
        {
            self.error = Some(format!("field `{}` is declared twice", logical_name));
        }
        self
    }

    /// Validate the declarations and freeze the schema
    pub fn build(self) -> EngineResult<EntitySchema> {
        if let Some(message) = self.error {
            return Err(EngineError::Schema {
                entity: self.entity_name,
                message,
            });
        }

        let mut fields = self.fields;
        for descriptor in fields.values_mut() {
            if descriptor.local_enabled.is_none() {
                descriptor.local_enabled = Some(self.default_local);
            }
            if descriptor.shared_enabled.is_none() {
                descriptor.shared_enabled = Some(self.default_shared);
            }
        }

        Ok(EntitySchema {
            entity_name: self.entity_name,
            collection: self.collection,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let schema = EntitySchema::builder("user", "user")
            .field("mail", FieldDescriptor::new("mail"))
            .field("password_hash", FieldDescriptor::new("password_hash").uncached())
            .build()
            .unwrap();

        assert_eq!(schema.entity_name(), "user");
        assert_eq!(schema.collection(), "user");
        assert_eq!(schema.len(), 2);

        let mail = schema.descriptor("mail").unwrap();
        assert!(mail.local_enabled());
        assert!(mail.shared_enabled());

        let hash = schema.descriptor("password_hash").unwrap();
        assert!(!hash.local_enabled());
        assert!(!hash.shared_enabled());
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let schema = EntitySchema::builder("user", "user")
            .field("mail", FieldDescriptor::new("mail"))
            .build()
            .unwrap();

        let err = schema.descriptor("shoe_size").unwrap_err();
        assert!(matches!(err, EngineError::UnknownField { .. }));
    }

    #[test]
    fn test_identity_store_name_is_rejected() {
        let result = EntitySchema::builder("user", "user")
            .field("id", FieldDescriptor::new("_id"))
            .build();
        assert!(matches!(result, Err(EngineError::Schema { .. })));
    }

    #[test]
    fn test_duplicate_declarations_are_rejected() {
        let result = EntitySchema::builder("user", "user")
            .field("mail", FieldDescriptor::new("mail"))
            .field("mail", FieldDescriptor::new("mail2"))
            .build();
        assert!(result.is_err());

        let result = EntitySchema::builder("user", "user")
            .field("mail", FieldDescriptor::new("mail"))
            .field("email", FieldDescriptor::new("mail"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_defaults_apply_unless_overridden() {
        let schema = EntitySchema::builder("session", "session")
            .cache_defaults(true, false)
            .field("token", FieldDescriptor::new("token"))
            .field("user", FieldDescriptor::new("user").shared_cache(true))
            .build()
            .unwrap();

        assert!(!schema.descriptor("token").unwrap().shared_enabled());
        assert!(schema.descriptor("user").unwrap().shared_enabled());
    }

    #[test]
    fn test_store_name_may_differ_from_logical_name() {
        let schema = EntitySchema::builder("user", "user")
            .field("first_name", FieldDescriptor::new("firstName"))
            .build()
            .unwrap();
        assert_eq!(
            schema.descriptor("first_name").unwrap().store_name(),
            "firstName"
        );
    }
}

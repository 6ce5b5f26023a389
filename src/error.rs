//! Error taxonomy for the field cache engine.
//!
//! The engine distinguishes four failure classes:
//! - Infrastructure errors (authoritative store unreachable or failed) are
//!   hard failures and propagate to the caller.
//! - Shared-cache degradation is never surfaced; the tier is treated as a
//!   miss and the transition is logged by the cache client.
//! - Schema errors (unknown logical field, invalid declaration) indicate
//!   programmer error and abort the operation.
//! - Converter errors carry the entity type, identity and field so the
//!   offending value can be located.
//!
//! "Not found" is not an error: absent identities and absent fields are
//! reported as `None` in results.

use thiserror::Error;

/// Errors produced by the field cache engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Authoritative store failure (connection, query or write)
    #[error("Authoritative store error: {0}")]
    Store(String),

    /// Shared cache failure; internal only, recovered as a tier miss
    #[error("Shared cache error: {0}")]
    SharedCache(String),

    /// Request for a logical field the schema does not declare
    #[error("Unknown field `{field}` for entity type `{entity}`")]
    UnknownField {
        /// Entity type name
        entity: String,
        /// Requested logical field name
        field: String,
    },

    /// Invalid schema declaration, rejected at build time
    #[error("Invalid schema for entity type `{entity}`: {message}")]
    Schema {
        /// Entity type name
        entity: String,
        /// What was wrong with the declaration
        message: String,
    },

    /// A tier codec rejected a value
    #[error("Conversion failed for {entity}:{identity} field `{field}`: {message}")]
    Convert {
        /// Entity type name
        entity: String,
        /// Identity of the row being converted
        identity: String,
        /// Logical field name
        field: String,
        /// Codec failure detail
        message: String,
    },

    /// User-supplied input rejected by the validator
    #[error("Invalid {kind}: {message}")]
    Validation {
        /// Which input kind failed validation
        kind: String,
        /// Why it was rejected
        message: String,
    },

    /// Password hashing or hash parsing failure
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// Malformed identity string
    #[error("Invalid identity: {0}")]
    Identity(String),

    /// Engine configuration or initialization failure
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::SharedCache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message() {
        let err = EngineError::UnknownField {
            entity: "user".to_string(),
            field: "shoe_size".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown field `shoe_size` for entity type `user`"
        );
    }

    #[test]
    fn test_convert_error_carries_context() {
        let err = EngineError::Convert {
            entity: "game".to_string(),
            identity: "5e9f8f8f8f8f8f8f8f8f8f8f".to_string(),
            field: "create_date".to_string(),
            message: "not an ISO-8601 timestamp".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("game"));
        assert!(text.contains("5e9f8f8f8f8f8f8f8f8f8f8f"));
        assert!(text.contains("create_date"));
    }
}

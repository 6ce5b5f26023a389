//! Row identities.
//!
//! An `Identity` is the opaque primary key of a row in an entity type. It
//! wraps a BSON ObjectId: comparable, hashable, and rendered as the 24-char
//! hex string used in shared-cache keys.

use bson::oid::ObjectId;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Opaque identity of a row in an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(ObjectId);

impl Identity {
    /// Generate a fresh identity
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parse an identity from its hex representation
    pub fn parse(s: &str) -> EngineResult<Self> {
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|e| EngineError::Identity(format!("{}: {}", s, e)))
    }

    /// Hex representation used in shared-cache keys
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// The underlying ObjectId, for store filters
    pub fn as_object_id(&self) -> ObjectId {
        self.0
    }

    /// The identity as a BSON value, for store filters
    pub fn to_bson(&self) -> Bson {
        Bson::ObjectId(self.0)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl FromStr for Identity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ObjectId> for Identity {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let id = Identity::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(Identity::parse(&hex).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Identity::parse("not-a-hex-id").is_err());
        assert!(Identity::parse("").is_err());
    }

    #[test]
    fn test_identities_are_unique() {
        assert_ne!(Identity::new(), Identity::new());
    }
}

//! Engine configuration.
//!
//! One `EngineConfig` describes a deployment: where the shared cache and the
//! authoritative store live, the tier-wide shared-cache TTL, and the
//! defaults applied to field declarations that do not override them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Configuration for the field cache engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// TTL for shared-cache field values and existence probes, in seconds.
    /// Tier-wide; individual fields cannot override it.
    pub shared_cache_ttl: u64,

    /// Redis connection URL for the shared cache
    pub shared_cache_address: String,

    /// MongoDB connection URL for the authoritative store
    pub store_address: String,

    /// Database name within the authoritative store
    pub store_database: String,

    /// Argon2 time cost used when hashing credentials
    pub password_hash_cost: u32,

    /// Whether the shared-cache tier is enabled at all. When false the
    /// engine runs on local cache + authoritative store only.
    pub redis_enable: bool,

    /// Default for `FieldDescriptor::local_enabled`
    pub local_cache_default_enabled: bool,

    /// Default for `FieldDescriptor::shared_enabled`
    pub shared_cache_default_enabled: bool,

    /// Deadline for a single shared-cache command, in milliseconds.
    /// Expiry is a tier-local failure and is treated as a miss.
    pub shared_op_timeout_ms: u64,

    /// Lifetime of a freshly created session, in seconds
    pub session_expire_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shared_cache_ttl: 60,
            shared_cache_address: "redis://127.0.0.1:6379".to_string(),
            store_address: "mongodb://127.0.0.1:27017".to_string(),
            store_database: "outpost".to_string(),
            password_hash_cost: 2,
            redis_enable: true,
            local_cache_default_enabled: true,
            shared_cache_default_enabled: true,
            shared_op_timeout_ms: 2_000,
            session_expire_secs: 60 * 60 * 24 * 14,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from its JSON form.
    ///
    /// Omitted options fall back to their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid configuration: {}", e)))
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }

    /// Shared-cache TTL as a `Duration`
    pub fn shared_ttl(&self) -> Duration {
        Duration::from_secs(self.shared_cache_ttl)
    }

    /// Shared-cache command deadline as a `Duration`
    pub fn shared_op_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_op_timeout_ms)
    }
}

//! Cache tiers of the field cache engine.
//!
//! - `local`: per-handle insertion-ordered field map, no TTL
//! - `shared`: remote key/value store client (Redis), TTL-bounded
//! - `memory`: in-process `SharedCache` backend for tests and
//!   single-process deployments
//! - `key`: the wire-visible shared-cache key layout

pub mod key;
pub mod local;
pub mod memory;
pub mod shared;

pub use key::KeyBuilder;
pub use local::LocalCache;
pub use memory::{MemorySharedCache, SharedCacheStats};
pub use shared::{DisabledSharedCache, RedisSharedCache, SharedCache};

//! Entity layer: handles, instance registries, and per-type managers.
//!
//! Control flow for a read: an `EntityManager` resolves an identity, asks
//! its `InstanceManager` for the `EntityHandle` bound to it, and the handle
//! walks the tiers (local cache, shared cache, authoritative store),
//! backfilling each higher tier on a miss.

pub mod handle;
pub mod instance;
pub mod manager;

pub use handle::EntityHandle;
pub use instance::InstanceManager;
pub use manager::EntityManager;

//! # OUTPOST - Game Server Data Layer
//!
//! The per-entity, per-field multi-tier data-access engine of the Outpost
//! game server.
//!
//! ## Architecture
//!
//! Every domain field is read and written through three tiers:
//!
//! - **Local cache**: per-handle in-memory map, no TTL
//! - **Shared cache**: Redis, TTL-bounded and advisory
//! - **Authoritative store**: MongoDB, the source of truth
//!
//! Reads fall through the tiers and backfill on the way out; writes go to
//! the authoritative store first and fan out to the caches only after the
//! store acknowledges. Each field independently declares which tiers it
//! participates in and how its value is converted at each tier boundary.
//!
//! ## Modules
//!
//! - `config`: deployment configuration
//! - `error`: engine error taxonomy
//! - `identity`: opaque row identities
//! - `convert`: field values and tier codecs
//! - `cache`: local cache, shared-cache clients, key layout
//! - `store`: authoritative-store clients
//! - `schema`: per-entity field schemas
//! - `entity`: handles, instance registries, per-type managers
//! - `auth`: password hashing and input validation
//! - `models`: the shipped entity types (user, game, session)
//! - `engine`: process-wide context and lifecycle
//!
//! ## Example
//!
//! ```rust,no_run
//! use outpost::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), outpost::EngineError> {
//!     let engine = Engine::init(EngineConfig::default()).await?;
//!
//!     let user = engine
//!         .users()
//!         .register("ada@example.com", "hunter2!", "Ada", "Lovelace", "")
//!         .await?;
//!     let game = engine.games().create(user.id(), "Grand Arena").await?;
//!     println!("{:?} owns {:?}", user.id(), game.id());
//!
//!     engine.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod convert;
pub mod engine;
pub mod entity;
pub mod error;
pub mod identity;
pub mod models;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use cache::{LocalCache, SharedCache};
pub use config::EngineConfig;
pub use convert::{FieldValue, SharedCodec, StoreCodec};
pub use engine::Engine;
pub use entity::{EntityHandle, EntityManager, InstanceManager};
pub use error::{EngineError, EngineResult};
pub use identity::Identity;
pub use models::{Game, GameManager, GameStage, Session, SessionManager, User, UserManager};
pub use schema::{EntitySchema, FieldDescriptor};
pub use store::AuthoritativeStore;

/// Re-export version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Concrete entity types of the game server.
//!
//! Each model declares its field schema and wraps the polymorphic entity
//! handle in hand-written typed accessors:
//!
//! - `user`: accounts with validated registration and credential checks
//! - `game`: games with lifecycle stages and unique names
//! - `session`: token-addressed login sessions

pub mod game;
pub mod session;
pub mod user;

pub use game::{Game, GameManager, GameStage};
pub use session::{Session, SessionManager};
pub use user::{User, UserManager};

//! Games.
//!
//! A game row records its creator, display name, lifecycle stage and
//! creation time. Stages are plain integers at the store level; the typed
//! view exposes them as `GameStage`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::validate::{self, InputKind};
use crate::cache::SharedCache;
use crate::config::EngineConfig;
use crate::convert::{FieldValue, SharedCodec};
use crate::entity::{EntityHandle, EntityManager};
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;
use crate::schema::{EntitySchema, FieldDescriptor};
use crate::store::AuthoritativeStore;

/// Logical field names of the game entity
pub mod fields {
    /// Identity of the creating user
    pub const USER: &str = "user";
    /// Display name (unique)
    pub const NAME: &str = "name";
    /// Lifecycle stage
    pub const STAGE: &str = "stage";
    /// Creation time
    pub const CREATE_DATE: &str = "create_date";
}

/// Lifecycle stage of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStage {
    /// Open for sign-ups, not yet started
    Lobby,
    /// Running
    Active,
    /// Finished
    Ended,
}

impl GameStage {
    /// Store-level integer form
    pub fn as_int(&self) -> i64 {
        match self {
            GameStage::Lobby => 0,
            GameStage::Active => 1,
            GameStage::Ended => 2,
        }
    }

    /// Parse the store-level integer form
    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            0 => Some(GameStage::Lobby),
            1 => Some(GameStage::Active),
            2 => Some(GameStage::Ended),
            _ => None,
        }
    }
}

/// Field schema of the game entity
pub fn schema(config: &EngineConfig) -> EngineResult<EntitySchema> {
    EntitySchema::builder("game", "game")
        .cache_defaults(
            config.local_cache_default_enabled,
            config.shared_cache_default_enabled,
        )
        .field(
            fields::USER,
            FieldDescriptor::new("user").shared_codec(SharedCodec::identity_hex()),
        )
        .field(fields::NAME, FieldDescriptor::new("name"))
        .field(
            fields::STAGE,
            FieldDescriptor::new("stage").shared_codec(SharedCodec::integer()),
        )
        .field(
            fields::CREATE_DATE,
            FieldDescriptor::new("create_date").shared_codec(SharedCodec::datetime()),
        )
        .build()
}

/// Typed view over one game row
#[derive(Debug, Clone)]
pub struct Game {
    handle: EntityHandle,
}

impl Game {
    /// Wrap a handle obtained from the game manager
    pub fn from_handle(handle: EntityHandle) -> Self {
        Self { handle }
    }

    /// Identity of this game
    pub fn id(&self) -> Identity {
        self.handle.identity()
    }

    /// The underlying polymorphic handle
    pub fn handle(&self) -> &EntityHandle {
        &self.handle
    }

    /// Display name
    pub async fn name(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::NAME)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Rename the game, validating the new name
    pub async fn set_name(&self, name: &str) -> EngineResult<()> {
        let name = validate::validate(InputKind::GameName, name)?;
        self.handle
            .set_field(fields::NAME, FieldValue::from(name))
            .await
    }

    /// Identity of the creating user
    pub async fn owner(&self) -> EngineResult<Option<Identity>> {
        Ok(self
            .handle
            .get_field(fields::USER)
            .await?
            .and_then(|v| v.as_id()))
    }

    /// Current lifecycle stage
    pub async fn stage(&self) -> EngineResult<Option<GameStage>> {
        let Some(value) = self.handle.get_field(fields::STAGE).await? else {
            return Ok(None);
        };
        let raw = value.as_int().ok_or_else(|| EngineError::Store(format!(
            "game {} has a non-integer stage",
            self.id()
        )))?;
        GameStage::from_int(raw)
            .map(Some)
            .ok_or_else(|| EngineError::Store(format!("game {} has unknown stage {}", self.id(), raw)))
    }

    /// Move the game to a new lifecycle stage
    pub async fn set_stage(&self, stage: GameStage) -> EngineResult<()> {
        self.handle
            .set_field(fields::STAGE, FieldValue::Int(stage.as_int()))
            .await
    }

    /// Creation time
    pub async fn create_date(&self) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(self
            .handle
            .get_field(fields::CREATE_DATE)
            .await?
            .and_then(|v| v.as_datetime()))
    }
}

/// Per-type facade for the game entity
pub struct GameManager {
    inner: EntityManager,
}

impl GameManager {
    /// Build the game manager against the given backends
    pub fn new(
        config: &EngineConfig,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> EngineResult<Self> {
        Ok(Self {
            inner: EntityManager::new(schema(config)?, shared, store, config.shared_ttl()),
        })
    }

    /// The generic entity manager underneath
    pub fn entity_manager(&self) -> &EntityManager {
        &self.inner
    }

    /// Typed view for an identity, via the instance registry
    pub fn game(&self, identity: Identity) -> Game {
        Game::from_handle(self.inner.handle(identity))
    }

    /// Whether a game with this identity exists (shared-cache probed)
    pub async fn exists_by_id(&self, identity: &Identity) -> EngineResult<bool> {
        self.inner.exists_by_id(identity).await
    }

    /// Find a game by display name
    pub async fn find_by_name(&self, name: &str) -> EngineResult<Option<Game>> {
        let name = validate::format(InputKind::GameName, name);
        Ok(self
            .inner
            .find_by_unique_field(fields::NAME, &FieldValue::from(name))
            .await?
            .map(Game::from_handle))
    }

    /// Create a game in the lobby stage
    pub async fn create(&self, owner: Identity, name: &str) -> EngineResult<Game> {
        let name = validate::validate(InputKind::GameName, name)?;
        if self.find_by_name(&name).await?.is_some() {
            return Err(EngineError::Validation {
                kind: InputKind::GameName.name().to_string(),
                message: "already taken".to_string(),
            });
        }

        let handle = self
            .inner
            .create(vec![
                (fields::USER, FieldValue::Id(owner)),
                (fields::NAME, FieldValue::from(name)),
                (fields::STAGE, FieldValue::Int(GameStage::Lobby.as_int())),
                (fields::CREATE_DATE, FieldValue::DateTime(Utc::now())),
            ])
            .await?;

        log::info!("Created game {} owned by {}", handle.identity(), owner);
        Ok(Game::from_handle(handle))
    }

    /// Drop every cached trace of the game type
    pub async fn flush(&self) -> EngineResult<()> {
        self.inner.flush().await
    }
}

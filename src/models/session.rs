//! Login sessions.
//!
//! A session binds a random token to a user identity with a fixed expiry.
//! Tokens are 32 random bytes rendered as hex; lookups go through the
//! unique token field. Sessions are immutable once created apart from
//! deletion, so every field rides the default caching configuration.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use std::sync::Arc;

use crate::cache::SharedCache;
use crate::config::EngineConfig;
use crate::convert::{FieldValue, SharedCodec};
use crate::entity::{EntityHandle, EntityManager};
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;
use crate::schema::{EntitySchema, FieldDescriptor};
use crate::store::AuthoritativeStore;

/// Logical field names of the session entity
pub mod fields {
    /// Identity of the owning user
    pub const USER: &str = "user";
    /// Session token (unique)
    pub const TOKEN: &str = "token";
    /// Creation time
    pub const CREATE_DATE: &str = "create_date";
    /// Expiry time
    pub const EXPIRE_DATE: &str = "expire_date";
}

/// Length of a session token in random bytes (rendered as hex)
const TOKEN_BYTES: usize = 32;

/// Field schema of the session entity
pub fn schema(config: &EngineConfig) -> EngineResult<EntitySchema> {
    EntitySchema::builder("session", "session")
        .cache_defaults(
            config.local_cache_default_enabled,
            config.shared_cache_default_enabled,
        )
        .field(
            fields::USER,
            FieldDescriptor::new("user").shared_codec(SharedCodec::identity_hex()),
        )
        .field(fields::TOKEN, FieldDescriptor::new("token"))
        .field(
            fields::CREATE_DATE,
            FieldDescriptor::new("create_date").shared_codec(SharedCodec::datetime()),
        )
        .field(
            fields::EXPIRE_DATE,
            FieldDescriptor::new("expire_date").shared_codec(SharedCodec::datetime()),
        )
        .build()
}

/// Generate a fresh session token
pub fn generate_token() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Typed view over one session row
#[derive(Clone)]
pub struct Session {
    handle: EntityHandle,
}

impl Session {
    /// Wrap a handle obtained from the session manager
    pub fn from_handle(handle: EntityHandle) -> Self {
        Self { handle }
    }

    /// Identity of this session
    pub fn id(&self) -> Identity {
        self.handle.identity()
    }

    /// The underlying polymorphic handle
    pub fn handle(&self) -> &EntityHandle {
        &self.handle
    }

    /// Identity of the owning user
    pub async fn user(&self) -> EngineResult<Option<Identity>> {
        Ok(self
            .handle
            .get_field(fields::USER)
            .await?
            .and_then(|v| v.as_id()))
    }

    /// The session token
    pub async fn token(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::TOKEN)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Creation time
    pub async fn create_date(&self) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(self
            .handle
            .get_field(fields::CREATE_DATE)
            .await?
            .and_then(|v| v.as_datetime()))
    }

    /// Expiry time
    pub async fn expire_date(&self) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(self
            .handle
            .get_field(fields::EXPIRE_DATE)
            .await?
            .and_then(|v| v.as_datetime()))
    }

    /// Whether the session has passed its expiry. A session whose expiry
    /// field is missing counts as expired.
    pub async fn is_expired(&self) -> EngineResult<bool> {
        Ok(match self.expire_date().await? {
            Some(expiry) => expiry <= Utc::now(),
            None => true,
        })
    }
}

/// Per-type facade for the session entity
pub struct SessionManager {
    inner: EntityManager,
    session_lifetime_secs: u64,
}

impl SessionManager {
    /// Build the session manager against the given backends
    pub fn new(
        config: &EngineConfig,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> EngineResult<Self> {
        Ok(Self {
            inner: EntityManager::new(schema(config)?, shared, store, config.shared_ttl()),
            session_lifetime_secs: config.session_expire_secs,
        })
    }

    /// The generic entity manager underneath
    pub fn entity_manager(&self) -> &EntityManager {
        &self.inner
    }

    /// Typed view for an identity, via the instance registry
    pub fn session(&self, identity: Identity) -> Session {
        Session::from_handle(self.inner.handle(identity))
    }

    /// Open a session for a user, returning the session and its token
    pub async fn open(&self, user: Identity) -> EngineResult<(Session, String)> {
        let token = generate_token();
        let now = Utc::now();
        let lifetime = i64::try_from(self.session_lifetime_secs).map_err(|_| {
            EngineError::Config("session lifetime does not fit in an i64".to_string())
        })?;
        let expire = now + ChronoDuration::seconds(lifetime);

        let handle = self
            .inner
            .create(vec![
                (fields::USER, FieldValue::Id(user)),
                (fields::TOKEN, FieldValue::from(token.clone())),
                (fields::CREATE_DATE, FieldValue::DateTime(now)),
                (fields::EXPIRE_DATE, FieldValue::DateTime(expire)),
            ])
            .await?;

        log::debug!("Opened session {} for user {}", handle.identity(), user);
        Ok((Session::from_handle(handle), token))
    }

    /// Resolve a token to its session
    pub async fn find_by_token(&self, token: &str) -> EngineResult<Option<Session>> {
        Ok(self
            .inner
            .find_by_unique_field(fields::TOKEN, &FieldValue::from(token))
            .await?
            .map(Session::from_handle))
    }

    /// Resolve a token to a live (unexpired) session
    pub async fn authenticate(&self, token: &str) -> EngineResult<Option<Session>> {
        let Some(session) = self.find_by_token(token).await? else {
            return Ok(None);
        };
        if session.is_expired().await? {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Close a session, removing its row and every cached trace of it
    pub async fn close(&self, session: &Session) -> EngineResult<()> {
        session.handle().flush().await
    }

    /// Drop every cached trace of the session type
    pub async fn flush(&self) -> EngineResult<()> {
        self.inner.flush().await
    }
}

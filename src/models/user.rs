//! User accounts.
//!
//! The user schema excludes the password hash from both cache tiers; the
//! hash only ever lives in the authoritative store and in the transient
//! comparison during a credential check. This is a security invariant of
//! the schema, not a tunable default.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::password;
use crate::auth::validate::{self, InputKind};
use crate::cache::SharedCache;
use crate::config::EngineConfig;
use crate::convert::{FieldValue, SharedCodec};
use crate::entity::{EntityHandle, EntityManager};
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;
use crate::schema::{EntitySchema, FieldDescriptor};
use crate::store::{projection_of, AuthoritativeStore, ID_FIELD};

/// Logical field names of the user entity
pub mod fields {
    /// Mail address (unique)
    pub const MAIL: &str = "mail";
    /// Argon2id password hash; never cached
    pub const PASSWORD_HASH: &str = "password_hash";
    /// Given name
    pub const FIRST_NAME: &str = "first_name";
    /// Family name
    pub const LAST_NAME: &str = "last_name";
    /// Optional display nickname
    pub const NICKNAME: &str = "nickname";
    /// Account creation time
    pub const CREATE_DATE: &str = "create_date";
}

/// Field schema of the user entity
pub fn schema(config: &EngineConfig) -> EngineResult<EntitySchema> {
    EntitySchema::builder("user", "user")
        .cache_defaults(
            config.local_cache_default_enabled,
            config.shared_cache_default_enabled,
        )
        .field(fields::MAIL, FieldDescriptor::new("mail"))
        .field(
            fields::PASSWORD_HASH,
            FieldDescriptor::new("password_hash").uncached(),
        )
        .field(fields::FIRST_NAME, FieldDescriptor::new("first_name"))
        .field(fields::LAST_NAME, FieldDescriptor::new("last_name"))
        .field(fields::NICKNAME, FieldDescriptor::new("nickname"))
        .field(
            fields::CREATE_DATE,
            FieldDescriptor::new("create_date").shared_codec(SharedCodec::datetime()),
        )
        .build()
}

/// Typed view over one user row
#[derive(Debug, Clone)]
pub struct User {
    handle: EntityHandle,
}

impl User {
    /// Wrap a handle obtained from the user manager
    pub fn from_handle(handle: EntityHandle) -> Self {
        Self { handle }
    }

    /// Identity of this user
    pub fn id(&self) -> Identity {
        self.handle.identity()
    }

    /// The underlying polymorphic handle
    pub fn handle(&self) -> &EntityHandle {
        &self.handle
    }

    /// Mail address
    pub async fn mail(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::MAIL)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Given name
    pub async fn first_name(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::FIRST_NAME)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Family name
    pub async fn last_name(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::LAST_NAME)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Display nickname, if the user set one
    pub async fn nickname(&self) -> EngineResult<Option<String>> {
        Ok(self
            .handle
            .get_field(fields::NICKNAME)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty()))
    }

    /// Account creation time
    pub async fn create_date(&self) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(self
            .handle
            .get_field(fields::CREATE_DATE)
            .await?
            .and_then(|v| v.as_datetime()))
    }

    /// Full display name, fetched as one batched read
    pub async fn display_name(&self) -> EngineResult<String> {
        let values = self
            .handle
            .get_fields(&[fields::FIRST_NAME, fields::LAST_NAME])
            .await?;
        let first = values
            .get(fields::FIRST_NAME)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let last = values
            .get(fields::LAST_NAME)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(format!("{} {}", first, last).trim().to_string())
    }

    /// Change the nickname, validating and formatting it first
    pub async fn set_nickname(&self, nickname: &str) -> EngineResult<()> {
        let nickname = validate::validate(InputKind::Nickname, nickname)?;
        self.handle
            .set_field(fields::NICKNAME, FieldValue::from(nickname))
            .await
    }

    /// Replace the password, hashing the new secret
    pub async fn set_password(&self, new_password: &str, hash_cost: u32) -> EngineResult<()> {
        let new_password = validate::validate(InputKind::Password, new_password)?;
        let hash = password::hash(&new_password, hash_cost)?;
        self.handle
            .set_field(fields::PASSWORD_HASH, FieldValue::from(hash))
            .await
    }
}

/// Per-type facade for the user entity
pub struct UserManager {
    inner: EntityManager,
    hash_cost: u32,
}

impl UserManager {
    /// Build the user manager against the given backends
    pub fn new(
        config: &EngineConfig,
        shared: Arc<dyn SharedCache>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> EngineResult<Self> {
        Ok(Self {
            inner: EntityManager::new(schema(config)?, shared, store, config.shared_ttl()),
            hash_cost: config.password_hash_cost,
        })
    }

    /// The generic entity manager underneath
    pub fn entity_manager(&self) -> &EntityManager {
        &self.inner
    }

    /// Typed view for an identity, via the instance registry
    pub fn user(&self, identity: Identity) -> User {
        User::from_handle(self.inner.handle(identity))
    }

    /// Whether a user with this identity exists (shared-cache probed)
    pub async fn exists_by_id(&self, identity: &Identity) -> EngineResult<bool> {
        self.inner.exists_by_id(identity).await
    }

    /// Find a user by mail address
    pub async fn find_by_mail(&self, mail: &str) -> EngineResult<Option<User>> {
        let mail = validate::format(InputKind::Mail, mail);
        Ok(self
            .inner
            .find_by_unique_field(fields::MAIL, &FieldValue::from(mail))
            .await?
            .map(User::from_handle))
    }

    /// Check a mail/password pair against the stored credentials.
    ///
    /// Fetches only the identity and the password hash from the
    /// authoritative store; the hash is compared and dropped, never cached.
    /// A missing account and a wrong password are both `None`;
    /// infrastructure failures are errors.
    pub async fn verify_credentials(
        &self,
        mail: &str,
        secret: &str,
    ) -> EngineResult<Option<User>> {
        let schema = self.inner.schema();
        let mail_name = schema.descriptor(fields::MAIL)?.store_name();
        let hash_name = schema.descriptor(fields::PASSWORD_HASH)?.store_name();

        let mail = validate::format(InputKind::Mail, mail);
        let mut filter = bson::Document::new();
        filter.insert(mail_name.to_string(), mail);

        let document = self
            .inner
            .store()
            .find_one(schema.collection(), filter, projection_of([hash_name]))
            .await?;

        let Some(document) = document else {
            return Ok(None);
        };
        let Ok(stored_hash) = document.get_str(hash_name) else {
            return Ok(None);
        };

        if !password::verify(secret, stored_hash)? {
            return Ok(None);
        }

        let oid = document.get_object_id(ID_FIELD).map_err(|e| {
            EngineError::Store(format!("credential row without identity: {}", e))
        })?;
        Ok(Some(self.user(Identity::from(oid))))
    }

    /// Register a new account: validate and format every input, hash the
    /// secret, insert the row, and hand out its typed view.
    pub async fn register(
        &self,
        mail: &str,
        password_plain: &str,
        first_name: &str,
        last_name: &str,
        nickname: &str,
    ) -> EngineResult<User> {
        let mail = validate::validate(InputKind::Mail, mail)?;
        let password_plain = validate::validate(InputKind::Password, password_plain)?;
        let first_name = validate::validate(InputKind::FirstName, first_name)?;
        let last_name = validate::validate(InputKind::LastName, last_name)?;
        let nickname = validate::validate(InputKind::Nickname, nickname)?;

        if self.find_by_mail(&mail).await?.is_some() {
            return Err(EngineError::Validation {
                kind: InputKind::Mail.name().to_string(),
                message: "already registered".to_string(),
            });
        }

        let hash = password::hash(&password_plain, self.hash_cost)?;
        let handle = self
            .inner
            .create(vec![
                (fields::MAIL, FieldValue::from(mail)),
                (fields::PASSWORD_HASH, FieldValue::from(hash)),
                (fields::FIRST_NAME, FieldValue::from(first_name)),
                (fields::LAST_NAME, FieldValue::from(last_name)),
                (fields::NICKNAME, FieldValue::from(nickname)),
                (fields::CREATE_DATE, FieldValue::DateTime(Utc::now())),
            ])
            .await?;

        log::info!("Registered user {}", handle.identity());
        Ok(User::from_handle(handle))
    }

    /// Drop every cached trace of the user type
    pub async fn flush(&self) -> EngineResult<()> {
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySharedCache;
    use crate::store::MemoryStore;

    fn manager() -> (UserManager, Arc<MemoryStore>, Arc<MemorySharedCache>) {
        let config = EngineConfig {
            password_hash_cost: 1,
            ..EngineConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::new(MemorySharedCache::new());
        let manager = UserManager::new(&config, shared.clone(), store.clone()).unwrap();
        (manager, store, shared)
    }

    #[tokio::test]
    async fn test_register_formats_inputs() {
        let (users, _, _) = manager();
        let user = users
            .register(" Ada@Example.COM ", "hunter2!", "ada", "lovelace", "")
            .await
            .unwrap();

        assert_eq!(user.mail().await.unwrap().unwrap(), "ada@example.com");
        assert_eq!(user.first_name().await.unwrap().unwrap(), "Ada");
        assert_eq!(user.last_name().await.unwrap().unwrap(), "Lovelace");
        assert_eq!(user.nickname().await.unwrap(), None);
        assert!(user.create_date().await.unwrap().is_some());
        assert_eq!(user.display_name().await.unwrap(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let (users, _, _) = manager();
        let err = users
            .register("not-a-mail", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let err = users
            .register("a@b.com", "abc", "Ada", "Lovelace", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_mail() {
        let (users, _, _) = manager();
        users
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();
        let err = users
            .register("A@B.com", "hunter2!", "Grace", "Hopper", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let (users, _, _) = manager();
        let registered = users
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();

        let verified = users
            .verify_credentials("A@b.com", "hunter2!")
            .await
            .unwrap()
            .expect("credentials should verify");
        assert_eq!(verified.id(), registered.id());

        assert!(users
            .verify_credentials("a@b.com", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(users
            .verify_credentials("nobody@b.com", "hunter2!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_password_hash_never_reaches_shared_cache() {
        let (users, _, shared) = manager();
        let user = users
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();

        let _ = users.verify_credentials("a@b.com", "hunter2!").await.unwrap();
        let _ = user.handle().get_field(fields::PASSWORD_HASH).await.unwrap();
        let _ = user.mail().await.unwrap();

        let hash_key = crate::cache::key::field_key("user", &user.id(), fields::PASSWORD_HASH);
        assert_eq!(shared.get(&hash_key).await.unwrap(), None);
        for key in shared.keys("model:user:*").await.unwrap() {
            assert!(!key.ends_with(&format!(":{}", fields::PASSWORD_HASH)));
        }
    }

    #[tokio::test]
    async fn test_set_password_rehashes() {
        let (users, _, _) = manager();
        let user = users
            .register("a@b.com", "hunter2!", "Ada", "Lovelace", "")
            .await
            .unwrap();

        user.set_password("correct-horse", 1).await.unwrap();
        assert!(users
            .verify_credentials("a@b.com", "hunter2!")
            .await
            .unwrap()
            .is_none());
        assert!(users
            .verify_credentials("a@b.com", "correct-horse")
            .await
            .unwrap()
            .is_some());
    }
}

//! Session Manager - identity binding, CSRF tokens and access bypass
//!
//! One manager exists per request. It wraps a [`SessionStore`] and keeps the
//! logged-in user in memory, mirroring the user's guid into the `guid`
//! session attribute so that the next request can restore it.

use crate::backend::MemoryBackend;
#[cfg(feature = "sqlite")]
use crate::error::SessionError;
use crate::file::FileBackend;
use crate::http::cookie_header;
use crate::store::{NativeSessionStore, SessionStore};
use margin_core::{
    async_trait, CacheInvalidator, CurrentUser, Guid, LocaleSwitcher, MarginConfig, MarginResult,
    NoopCache, OsTokenSource, SessionBackendKind, SessionConfig, StaticLocale, TokenSource, User,
    UserLookup,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Session attribute holding the CSRF token
pub const CSRF_TOKEN_KEY: &str = "__elgg_session";

/// Session attribute holding the logged-in user's guid
pub const USER_GUID_KEY: &str = "guid";

/// Attribute names reserved by the session manager and its framework
pub const RESERVED_ATTRIBUTES: [&str; 10] = [
    "last_forward_from",
    "msg",
    "sticky_forms",
    "user",
    "guid",
    "id",
    "code",
    "name",
    "username",
    CSRF_TOKEN_KEY,
];

/// Whether general-purpose consumers must stay away from an attribute name
pub fn is_reserved(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}

/// Collaborators the manager drives as side effects
#[derive(Clone)]
pub struct SessionServices {
    /// Cleared whenever the logged-in identity changes
    pub entity_cache: Arc<dyn CacheInvalidator>,
    /// Cleared whenever the access bypass is toggled
    pub access_cache: Arc<dyn CacheInvalidator>,
    pub tokens: Arc<dyn TokenSource>,
    pub locale: Arc<dyn LocaleSwitcher>,
    /// Applied when a user has no language of their own
    pub default_language: String,
}

impl Default for SessionServices {
    fn default() -> Self {
        Self {
            entity_cache: Arc::new(NoopCache),
            access_cache: Arc::new(NoopCache),
            tokens: Arc::new(OsTokenSource::new()),
            locale: Arc::new(StaticLocale::default()),
            default_language: "en".to_string(),
        }
    }
}

impl SessionServices {
    pub fn with_entity_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.entity_cache = cache;
        self
    }

    pub fn with_access_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.access_cache = cache;
        self
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_locale(mut self, locale: Arc<dyn LocaleSwitcher>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    params: SessionConfig,
    services: SessionServices,
    logged_in_user: RwLock<Option<User>>,
    ignore_access: AtomicBool,
    show_hidden_entities: AtomicBool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        params: SessionConfig,
        services: SessionServices,
    ) -> Self {
        Self {
            store,
            params,
            services,
            logged_in_user: RwLock::new(None),
            ignore_access: AtomicBool::new(false),
            show_hidden_entities: AtomicBool::new(false),
        }
    }

    /// Isolated, non-persistent session for tests and one-off tools
    pub fn mock(services: SessionServices) -> Self {
        Self::new(
            Arc::new(NativeSessionStore::mock()),
            SessionConfig::default(),
            services,
        )
    }

    /// Session persisted in the `sessions` table
    #[cfg(feature = "sqlite")]
    pub async fn from_database(
        pool: sqlx::SqlitePool,
        params: SessionConfig,
        services: SessionServices,
    ) -> MarginResult<Self> {
        let lifetime = Duration::from_secs(params.lifetime_secs);
        let backend = crate::sqlite::SqliteBackend::new(pool, lifetime).await?;
        let store = NativeSessionStore::new(backend, params.name.clone());
        Ok(Self::new(Arc::new(store), params, services))
    }

    /// Session persisted as files under `save_path`
    pub fn from_files<P: AsRef<Path>>(
        save_path: P,
        params: SessionConfig,
        services: SessionServices,
    ) -> MarginResult<Self> {
        let lifetime = Duration::from_secs(params.lifetime_secs);
        let backend = FileBackend::new(save_path, lifetime)?;
        let store = NativeSessionStore::new(backend, params.name.clone());
        Ok(Self::new(Arc::new(store), params, services))
    }

    /// Build the manager for the backend named in the configuration
    pub async fn from_config(config: &MarginConfig, services: SessionServices) -> MarginResult<Self> {
        config.validate()?;
        let params = config.session.clone();
        let services = services.with_default_language(config.default_language.clone());

        match params.backend {
            SessionBackendKind::Memory => {
                let store = NativeSessionStore::new(MemoryBackend::new(), params.name.clone());
                Ok(Self::new(Arc::new(store), params, services))
            }
            #[cfg(feature = "sqlite")]
            SessionBackendKind::Database => {
                let pool = sqlx::SqlitePool::connect(&config.database.url)
                    .await
                    .map_err(SessionError::from)?;
                Self::from_database(pool, params, services).await
            }
            #[cfg(not(feature = "sqlite"))]
            SessionBackendKind::Database => Err(margin_core::config_error!(
                "database session backend requires the sqlite feature",
                "session"
            )),
            SessionBackendKind::Files => {
                let save_path = params.save_path.clone().ok_or_else(|| {
                    margin_core::config_error!("session.save_path is not set", "session")
                })?;
                Self::from_files(save_path, params, services)
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn params(&self) -> &SessionConfig {
        &self.params
    }

    /// Start the session and make sure it carries a CSRF token
    pub async fn start(&self) -> MarginResult<bool> {
        let started = self.store.start().await.map_err(|e| {
            warn!("Session failed to start: {}", e);
            e
        })?;

        if !self.store.has(CSRF_TOKEN_KEY).await {
            self.generate_session_token().await;
        }

        Ok(started)
    }

    /// Restore the logged-in user recorded by a previous request
    ///
    /// Call after [`start`](Self::start). A recorded guid that is malformed or
    /// no longer resolves to an active user is dropped from the session.
    pub async fn boot(&self, users: &dyn UserLookup) -> MarginResult<Option<User>> {
        if let Some(user) = self.logged_in_user().await {
            return Ok(Some(user));
        }

        let guid = match self.store.get(USER_GUID_KEY).await {
            None => return Ok(None),
            Some(value) => match value.as_i64() {
                Some(guid) => guid,
                None => {
                    warn!(value = %value, "Session guid is not an integer, logging out");
                    self.remove_logged_in_user().await;
                    return Ok(None);
                }
            },
        };

        match users.get_user(guid).await? {
            Some(user) if !user.banned => {
                debug!(guid, "Restored logged-in user from session");
                self.set_logged_in_user(user.clone()).await;
                Ok(Some(user))
            }
            Some(_) => {
                info!(guid, "Banned user found in session, logging out");
                self.remove_logged_in_user().await;
                Ok(None)
            }
            None => {
                info!(guid, "Session refers to a missing user, logging out");
                self.remove_logged_in_user().await;
                Ok(None)
            }
        }
    }

    /// Flush attributes to the backend
    pub async fn save(&self) -> MarginResult<()> {
        Ok(self.store.save().await?)
    }

    /// Rotate the session id, keeping attributes
    pub async fn migrate(&self, destroy: bool) -> MarginResult<bool> {
        Ok(self.store.migrate(destroy).await?)
    }

    /// Drop all attributes and the bound identity, issue a new id and token
    pub async fn invalidate(&self) -> MarginResult<bool> {
        self.store.clear().await;
        *self.logged_in_user.write().await = None;

        let result = self.migrate(true).await?;
        self.generate_session_token().await;

        info!("Session invalidated");
        Ok(result)
    }

    pub async fn is_started(&self) -> bool {
        self.store.is_started().await
    }

    pub async fn id(&self) -> String {
        self.store.id().await
    }

    pub async fn set_id(&self, id: impl Into<String>) -> MarginResult<()> {
        Ok(self.store.set_id(id.into()).await?)
    }

    pub async fn name(&self) -> String {
        self.store.name().await
    }

    pub async fn set_name(&self, name: impl Into<String>) -> MarginResult<()> {
        Ok(self.store.set_name(name.into()).await?)
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.store.get(name).await
    }

    /// Attribute value, or `default` when unset
    pub async fn get_or(&self, name: &str, default: impl Into<Value>) -> Value {
        match self.store.get(name).await {
            Some(value) => value,
            None => default.into(),
        }
    }

    pub async fn set(&self, name: &str, value: impl Into<Value>) {
        self.store.set(name, value.into()).await;
    }

    /// Remove an attribute, returning its value if it was set
    pub async fn remove(&self, name: &str) -> Option<Value> {
        self.store.remove(name).await
    }

    pub async fn has(&self, name: &str) -> bool {
        self.store.has(name).await
    }

    pub async fn all(&self) -> crate::SessionAttributes {
        self.store.all().await
    }

    /// Bind a user to this session
    ///
    /// Re-binding an equal user does nothing; a different user clears the
    /// entity cache and switches the locale to the user's language.
    pub async fn set_logged_in_user(&self, user: User) {
        let mut current = self.logged_in_user.write().await;
        if current.as_ref() == Some(&user) {
            return;
        }

        self.store.set(USER_GUID_KEY, Value::from(user.guid)).await;

        let language = user
            .language
            .clone()
            .unwrap_or_else(|| self.services.default_language.clone());
        let guid = user.guid;
        *current = Some(user);
        drop(current);

        self.services.entity_cache.clear();
        self.services.locale.set_current_language(&language);
        info!(guid, language = %language, "User logged in to session");
    }

    pub async fn logged_in_user(&self) -> Option<User> {
        self.logged_in_user.read().await.clone()
    }

    /// Guid of the logged-in user, `0` when nobody is logged in
    pub async fn logged_in_user_guid(&self) -> Guid {
        self.logged_in_user
            .read()
            .await
            .as_ref()
            .map_or(0, |user| user.guid)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.logged_in_user.read().await.is_some()
    }

    pub async fn is_admin_logged_in(&self) -> bool {
        self.logged_in_user
            .read()
            .await
            .as_ref()
            .is_some_and(User::is_admin)
    }

    /// Unbind the user; other session attributes survive
    pub async fn remove_logged_in_user(&self) {
        self.store.remove(USER_GUID_KEY).await;
        let previous = self.logged_in_user.write().await.take();
        self.services.entity_cache.clear();

        if let Some(user) = previous {
            info!(guid = user.guid, "User logged out of session");
        }
    }

    pub fn ignore_access(&self) -> bool {
        self.ignore_access.load(Ordering::SeqCst)
    }

    /// Toggle the access bypass, returning the previous setting
    pub fn set_ignore_access(&self, ignore: bool) -> bool {
        self.services.access_cache.clear();
        let previous = self.ignore_access.swap(ignore, Ordering::SeqCst);
        debug!(ignore, previous, "Access bypass toggled");
        previous
    }

    pub fn show_hidden_entities(&self) -> bool {
        self.show_hidden_entities.load(Ordering::SeqCst)
    }

    /// Toggle visibility of disabled entities, returning the previous setting
    pub fn set_show_hidden_entities(&self, show: bool) -> bool {
        self.show_hidden_entities.swap(show, Ordering::SeqCst)
    }

    pub async fn csrf_token(&self) -> Option<String> {
        self.store
            .get(CSRF_TOKEN_KEY)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Check a submitted token against the session's token
    pub async fn validate_csrf_token(&self, submitted: &str) -> bool {
        let Some(expected) = self.csrf_token().await else {
            return false;
        };
        // Comparing digests keeps the comparison time independent of
        // where the strings first differ.
        Sha256::digest(expected.as_bytes()) == Sha256::digest(submitted.as_bytes())
    }

    /// `Set-Cookie` value for the current session id
    pub async fn cookie_header(&self) -> String {
        cookie_header(&self.params, &self.store.id().await)
    }

    async fn generate_session_token(&self) {
        let token = self.services.tokens.random_string(self.params.token_length);
        self.store.set(CSRF_TOKEN_KEY, Value::from(token)).await;
        debug!("Generated CSRF token");
    }
}

#[async_trait]
impl CurrentUser for SessionManager {
    async fn current_user(&self) -> Option<User> {
        self.logged_in_user().await
    }
}

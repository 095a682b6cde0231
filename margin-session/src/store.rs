//! Session store - attribute bag over a persistence backend

use crate::backend::{generate_session_id, MemoryBackend, SessionAttributes, SessionBackend};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Key/value session storage addressed by a session identifier
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start the session, loading persisted attributes for the current id
    async fn start(&self) -> SessionResult<bool>;

    /// Give the session a new identifier while keeping its attributes.
    /// With `destroy`, the record under the old identifier is deleted.
    async fn migrate(&self, destroy: bool) -> SessionResult<bool>;

    /// Flush attributes to the backend
    async fn save(&self) -> SessionResult<()>;

    /// Drop every attribute
    async fn clear(&self);

    async fn is_started(&self) -> bool;

    async fn id(&self) -> String;

    async fn set_id(&self, id: String) -> SessionResult<()>;

    async fn name(&self) -> String;

    async fn set_name(&self, name: String) -> SessionResult<()>;

    async fn get(&self, name: &str) -> Option<Value>;

    async fn set(&self, name: &str, value: Value);

    async fn remove(&self, name: &str) -> Option<Value>;

    async fn has(&self, name: &str) -> bool;

    /// Snapshot of all attributes
    async fn all(&self) -> SessionAttributes;
}

#[derive(Debug, Default)]
struct SessionState {
    id: String,
    name: String,
    started: bool,
    attributes: SessionAttributes,
}

/// The standard store: in-memory attributes persisted through a backend
pub struct NativeSessionStore<B: SessionBackend> {
    backend: B,
    state: RwLock<SessionState>,
}

impl<B: SessionBackend> NativeSessionStore<B> {
    pub fn new(backend: B, name: impl Into<String>) -> Self {
        Self {
            backend,
            state: RwLock::new(SessionState {
                name: name.into(),
                ..SessionState::default()
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl NativeSessionStore<MemoryBackend> {
    /// Isolated store that persists nothing beyond this instance
    pub fn mock() -> Self {
        Self::new(MemoryBackend::new(), "MOCKSESSID")
    }
}

#[async_trait]
impl<B: SessionBackend> SessionStore for NativeSessionStore<B> {
    async fn start(&self) -> SessionResult<bool> {
        let mut state = self.state.write().await;
        if state.started {
            return Ok(true);
        }

        if state.id.is_empty() {
            state.id = generate_session_id();
            debug!(backend = self.backend.name(), "Issued new session id");
        } else {
            let loaded = self
                .backend
                .read(&state.id)
                .await
                .map_err(|e| SessionError::Startup {
                    message: format!("{} backend could not load session: {}", self.backend.name(), e),
                })?;

            match loaded {
                Some(attributes) => state.attributes = attributes,
                None => debug!(
                    backend = self.backend.name(),
                    "No live session record, starting empty"
                ),
            }
        }

        state.started = true;
        info!(backend = self.backend.name(), "Session started");
        Ok(true)
    }

    async fn migrate(&self, destroy: bool) -> SessionResult<bool> {
        if !self.is_started().await {
            self.start().await?;
        }

        let mut state = self.state.write().await;
        let old_id = std::mem::replace(&mut state.id, generate_session_id());

        if destroy {
            if let Err(e) = self.backend.destroy(&old_id).await {
                warn!(
                    backend = self.backend.name(),
                    "Failed to destroy previous session record: {}", e
                );
                return Ok(false);
            }
        }

        debug!(
            backend = self.backend.name(),
            destroy, "Session id migrated"
        );
        Ok(true)
    }

    async fn save(&self) -> SessionResult<()> {
        let state = self.state.read().await;
        if !state.started {
            return Ok(());
        }
        self.backend.write(&state.id, &state.attributes).await
    }

    async fn clear(&self) {
        self.state.write().await.attributes.clear();
    }

    async fn is_started(&self) -> bool {
        self.state.read().await.started
    }

    async fn id(&self) -> String {
        self.state.read().await.id.clone()
    }

    async fn set_id(&self, id: String) -> SessionResult<()> {
        let mut state = self.state.write().await;
        if state.started {
            return Err(SessionError::Active { field: "id" });
        }
        state.id = id;
        Ok(())
    }

    async fn name(&self) -> String {
        self.state.read().await.name.clone()
    }

    async fn set_name(&self, name: String) -> SessionResult<()> {
        let mut state = self.state.write().await;
        if state.started {
            return Err(SessionError::Active { field: "name" });
        }
        state.name = name;
        Ok(())
    }

    async fn get(&self, name: &str) -> Option<Value> {
        self.state.read().await.attributes.get(name).cloned()
    }

    async fn set(&self, name: &str, value: Value) {
        self.state
            .write()
            .await
            .attributes
            .insert(name.to_string(), value);
    }

    async fn remove(&self, name: &str) -> Option<Value> {
        self.state.write().await.attributes.remove(name)
    }

    async fn has(&self, name: &str) -> bool {
        self.state.read().await.attributes.contains_key(name)
    }

    async fn all(&self) -> SessionAttributes {
        self.state.read().await.attributes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_start_issues_id_once() {
        let store = NativeSessionStore::mock();
        assert!(!store.is_started().await);
        assert!(store.start().await.unwrap());

        let id = store.id().await;
        assert!(!id.is_empty());
        assert!(store.start().await.unwrap());
        assert_eq!(store.id().await, id);
    }

    #[tokio::test]
    async fn test_start_loads_persisted_attributes() {
        let backend = MemoryBackend::new();
        let first = NativeSessionStore::new(backend.clone(), "S");
        first.start().await.unwrap();
        first.set("guid", json!(5)).await;
        first.save().await.unwrap();

        let second = NativeSessionStore::new(backend, "S");
        second.set_id(first.id().await).await.unwrap();
        second.start().await.unwrap();
        assert_eq!(second.get("guid").await, Some(json!(5)));
    }

    #[tokio::test]
    async fn test_migrate_keeps_attributes_and_destroys_old_record() {
        let backend = MemoryBackend::new();
        let store = NativeSessionStore::new(backend.clone(), "S");
        store.start().await.unwrap();
        store.set("msg", json!("hello")).await;
        store.save().await.unwrap();
        let old_id = store.id().await;

        assert!(store.migrate(true).await.unwrap());
        assert_ne!(store.id().await, old_id);
        assert_eq!(store.get("msg").await, Some(json!("hello")));
        assert!(backend.read(&old_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrate_without_destroy_leaves_old_record() {
        let backend = MemoryBackend::new();
        let store = NativeSessionStore::new(backend.clone(), "S");
        store.start().await.unwrap();
        store.save().await.unwrap();
        let old_id = store.id().await;

        store.migrate(false).await.unwrap();
        assert!(backend.read(&old_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_active_session_refuses_id_and_name_changes() {
        let store = NativeSessionStore::mock();
        store.set_name("Custom".to_string()).await.unwrap();
        store.start().await.unwrap();

        assert!(matches!(
            store.set_id("other".to_string()).await,
            Err(SessionError::Active { field: "id" })
        ));
        assert!(store.set_name("Again".to_string()).await.is_err());
        assert_eq!(store.name().await, "Custom");
    }

    #[tokio::test]
    async fn test_attribute_passthrough() {
        let store = NativeSessionStore::mock();
        store.start().await.unwrap();

        assert!(!store.has("sticky_forms").await);
        store.set("sticky_forms", json!({"title": "draft"})).await;
        assert!(store.has("sticky_forms").await);
        assert_eq!(
            store.remove("sticky_forms").await,
            Some(json!({"title": "draft"}))
        );
        assert_eq!(store.remove("sticky_forms").await, None);

        store.set("a", json!(1)).await;
        store.clear().await;
        assert!(store.all().await.is_empty());
    }
}

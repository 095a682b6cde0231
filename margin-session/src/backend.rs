//! Session persistence backends
//!
//! A backend only moves attribute maps in and out of durable storage. Id
//! generation, the started flag and the attribute bag live in the store.

use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use rand::{rngs::OsRng, Rng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Attribute name to value
pub type SessionAttributes = HashMap<String, serde_json::Value>;

const SESSION_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const SESSION_ID_LENGTH: usize = 32;

/// Generate a fresh random session identifier
pub fn generate_session_id() -> String {
    let mut rng = OsRng;
    (0..SESSION_ID_LENGTH)
        .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect()
}

/// Reject ids that could escape a storage namespace (file names, keys)
pub fn validate_session_id(id: &str) -> SessionResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b',');
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId { id: id.to_string() })
    }
}

/// Durable storage for session attribute maps
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Load the attributes of an unexpired session
    async fn read(&self, id: &str) -> SessionResult<Option<SessionAttributes>>;

    async fn write(&self, id: &str, attributes: &SessionAttributes) -> SessionResult<()>;

    async fn destroy(&self, id: &str) -> SessionResult<()>;

    /// Remove expired sessions, returning how many were removed
    async fn gc(&self) -> SessionResult<u64>;
}

/// Isolated in-process backend. Nothing survives the backend instance.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    sessions: Arc<RwLock<HashMap<String, SessionAttributes>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, id: &str) -> SessionResult<Option<SessionAttributes>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn write(&self, id: &str, attributes: &SessionAttributes) -> SessionResult<()> {
        self.sessions
            .write()
            .await
            .insert(id.to_string(), attributes.clone());
        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn gc(&self) -> SessionResult<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), SESSION_ID_LENGTH);
        assert!(validate_session_id(&a).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_path_like_ids_rejected() {
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("abc/def").is_err());
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();
        let mut attributes = SessionAttributes::new();
        attributes.insert("guid".to_string(), json!(7));

        backend.write("abc", &attributes).await.unwrap();
        assert_eq!(backend.read("abc").await.unwrap(), Some(attributes));

        backend.destroy("abc").await.unwrap();
        assert!(backend.read("abc").await.unwrap().is_none());
        assert!(backend.is_empty().await);
    }
}

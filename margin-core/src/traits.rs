//! Collaborator trait definitions
//!
//! Sessions and extenders never reach for ambient globals. Everything they
//! touch outside their own state is one of these traits, passed in by the caller.

use crate::error::MarginResult;
use crate::types::{EntityRef, Guid, User};
use async_trait::async_trait;
use rand::{rngs::OsRng, Rng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::RwLock;

/// A cache that must forget everything it holds
pub trait CacheInvalidator: Send + Sync {
    fn clear(&self);
}

/// Switches the active translation context
pub trait LocaleSwitcher: Send + Sync {
    fn set_current_language(&self, language: &str);

    fn current_language(&self) -> String;
}

/// Cryptographically secure random strings
pub trait TokenSource: Send + Sync {
    fn random_string(&self, length: usize) -> String;
}

/// Resolves users by guid
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn get_user(&self, guid: Guid) -> MarginResult<Option<User>>;
}

/// Resolves entities by guid
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn get_entity(&self, guid: Guid) -> MarginResult<Option<EntityRef>>;
}

/// The identity acting in the current request
#[async_trait]
pub trait CurrentUser: Send + Sync {
    async fn current_user(&self) -> Option<User>;
}

/// Cache that holds nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl CacheInvalidator for NoopCache {
    fn clear(&self) {}
}

/// Counts how often it has been cleared
#[derive(Debug, Default)]
pub struct ClearCounter {
    clears: AtomicUsize,
}

impl ClearCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl CacheInvalidator for ClearCounter {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Locale holder for a single process
#[derive(Debug)]
pub struct StaticLocale {
    language: StdRwLock<String>,
}

impl StaticLocale {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: StdRwLock::new(language.into()),
        }
    }
}

impl Default for StaticLocale {
    fn default() -> Self {
        Self::new("en")
    }
}

impl LocaleSwitcher for StaticLocale {
    fn set_current_language(&self, language: &str) {
        match self.language.write() {
            Ok(mut current) => *current = language.to_string(),
            Err(poisoned) => *poisoned.into_inner() = language.to_string(),
        }
    }

    fn current_language(&self) -> String {
        match self.language.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Characters that cannot be confused with one another when read back
pub const UNAMBIGUOUS_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Random strings over [`UNAMBIGUOUS_ALPHABET`], drawn from the operating system RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl OsTokenSource {
    pub fn new() -> Self {
        Self
    }
}

impl TokenSource for OsTokenSource {
    fn random_string(&self, length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| UNAMBIGUOUS_ALPHABET[rng.gen_range(0..UNAMBIGUOUS_ALPHABET.len())] as char)
            .collect()
    }
}

/// In-process registry of users and entities
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    users: Arc<RwLock<HashMap<Guid, User>>>,
    entities: Arc<RwLock<HashMap<Guid, EntityRef>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: User) {
        // Users are entities too; they own themselves.
        let entity = EntityRef::new(user.guid, user.guid, "user");
        self.entities.write().await.insert(user.guid, entity);
        self.users.write().await.insert(user.guid, user);
    }

    pub async fn add_entity(&self, entity: EntityRef) {
        self.entities.write().await.insert(entity.guid, entity);
    }

    pub async fn remove_user(&self, guid: Guid) -> Option<User> {
        self.entities.write().await.remove(&guid);
        self.users.write().await.remove(&guid)
    }
}

#[async_trait]
impl UserLookup for MemoryDirectory {
    async fn get_user(&self, guid: Guid) -> MarginResult<Option<User>> {
        Ok(self.users.read().await.get(&guid).cloned())
    }
}

#[async_trait]
impl EntityLookup for MemoryDirectory {
    async fn get_entity(&self, guid: Guid) -> MarginResult<Option<EntityRef>> {
        Ok(self.entities.read().await.get(&guid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_source_length_and_alphabet() {
        let source = OsTokenSource::new();
        let token = source.random_string(22);
        assert_eq!(token.len(), 22);
        assert!(token.bytes().all(|b| UNAMBIGUOUS_ALPHABET.contains(&b)));
        assert_ne!(token, source.random_string(22));
    }

    #[test]
    fn test_token_source_edge_lengths() {
        let source = OsTokenSource::default();
        assert!(source.random_string(0).is_empty());

        let long = source.random_string(512);
        assert_eq!(long.len(), 512);
        assert!(long.bytes().all(|b| UNAMBIGUOUS_ALPHABET.contains(&b)));
        assert!(!long.contains(['0', 'O', '1', 'l', 'I']));
    }

    #[test]
    fn test_clear_counter() {
        let counter = ClearCounter::new();
        counter.clear();
        counter.clear();
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_static_locale_switches() {
        let locale = StaticLocale::default();
        assert_eq!(locale.current_language(), "en");
        locale.set_current_language("es");
        assert_eq!(locale.current_language(), "es");
    }

    #[test]
    fn test_directory_lookups() {
        tokio_test::block_on(async {
            let directory = MemoryDirectory::new();
            directory.add_user(User::new(7, "alice")).await;
            directory.add_entity(EntityRef::new(42, 7, "object")).await;

            assert_eq!(directory.get_user(7).await.unwrap().unwrap().username, "alice");
            assert_eq!(directory.get_entity(7).await.unwrap().unwrap().kind, "user");
            assert_eq!(directory.get_entity(42).await.unwrap().unwrap().owner_guid, 7);
            assert!(directory.get_user(42).await.unwrap().is_none());

            directory.remove_user(7).await;
            assert!(directory.get_user(7).await.unwrap().is_none());
        });
    }
}

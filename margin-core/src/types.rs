//! Core data type definitions

use serde::{Deserialize, Serialize};

/// Global identifier of a user or entity. `0` means "nobody".
pub type Guid = i64;

/// An authenticated identity that can be bound to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub guid: Guid,
    pub username: String,
    pub name: String,
    /// Preferred language code; the site default applies when unset
    pub language: Option<String>,
    pub admin: bool,
    pub banned: bool,
}

impl User {
    pub fn new(guid: Guid, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            guid,
            name: username.clone(),
            username,
            language: None,
            admin: false,
            banned: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }
}

/// The parts of an entity needed to make ownership decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub guid: Guid,
    pub owner_guid: Guid,
    pub container_guid: Guid,
    /// Entity type such as `object`, `user` or `group`
    pub kind: String,
}

impl EntityRef {
    pub fn new(guid: Guid, owner_guid: Guid, kind: impl Into<String>) -> Self {
        Self {
            guid,
            owner_guid,
            container_guid: owner_guid,
            kind: kind.into(),
        }
    }

    pub fn with_container(mut self, container_guid: Guid) -> Self {
        self.container_guid = container_guid;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder() {
        let user = User::new(7, "alice").with_language("fr").with_admin(true);
        assert_eq!(user.name, "alice");
        assert_eq!(user.language.as_deref(), Some("fr"));
        assert!(user.is_admin());
        assert!(!user.banned);
    }

    #[test]
    fn test_users_with_same_guid_but_different_language_differ() {
        let a = User::new(7, "alice");
        let b = User::new(7, "alice").with_language("de");
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_container_defaults_to_owner() {
        let entity = EntityRef::new(42, 7, "object");
        assert_eq!(entity.container_guid, 7);
        assert_eq!(entity.with_container(9).container_guid, 9);
    }
}

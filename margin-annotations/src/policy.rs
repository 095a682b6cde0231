//! Edit permission rules for extenders

use crate::extender::{ExtenderAttributes, ExtenderKind};
use async_trait::async_trait;
use margin_core::{EntityRef, User};

/// Decides whether a user may change an annotation or metadata record
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// `entity` is what the record is attached to, `None` when it is gone
    async fn can_edit_extender(
        &self,
        kind: ExtenderKind,
        extender: &ExtenderAttributes,
        entity: Option<&EntityRef>,
        user: Option<&User>,
    ) -> bool;
}

/// Nobody anonymous, admins always, otherwise the record's owner or whoever
/// owns the entity it hangs on
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccessPolicy;

impl DefaultAccessPolicy {
    pub fn new() -> Self {
        Self
    }

    fn can_edit_entity(entity: &EntityRef, user: &User) -> bool {
        entity.guid == user.guid
            || entity.owner_guid == user.guid
            || entity.container_guid == user.guid
    }
}

#[async_trait]
impl AccessPolicy for DefaultAccessPolicy {
    async fn can_edit_extender(
        &self,
        kind: ExtenderKind,
        extender: &ExtenderAttributes,
        entity: Option<&EntityRef>,
        user: Option<&User>,
    ) -> bool {
        let Some(user) = user else {
            return false;
        };
        if user.banned {
            return false;
        }
        if user.is_admin() {
            return true;
        }

        let owns_record = extender.owner_guid == user.guid;
        let owns_entity = entity.map_or(false, |entity| Self::can_edit_entity(entity, user));

        match kind {
            ExtenderKind::Annotation => owns_record || owns_entity,
            // Unowned metadata belongs to whoever can edit the entity.
            ExtenderKind::Metadata => {
                owns_entity || (extender.owner_guid != 0 && owns_record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(owner_guid: i64) -> ExtenderAttributes {
        ExtenderAttributes {
            entity_guid: 42,
            owner_guid,
            name: "rating".to_string(),
            ..ExtenderAttributes::default()
        }
    }

    #[tokio::test]
    async fn test_anonymous_cannot_edit() {
        let policy = DefaultAccessPolicy::new();
        let entity = EntityRef::new(42, 1, "object");
        assert!(
            !policy
                .can_edit_extender(ExtenderKind::Annotation, &attached(7), Some(&entity), None)
                .await
        );
    }

    #[tokio::test]
    async fn test_owner_entity_owner_and_admin_can_edit() {
        let policy = DefaultAccessPolicy::new();
        let entity = EntityRef::new(42, 1, "object");
        let annotation = attached(7);

        for user in [
            User::new(7, "author"),
            User::new(1, "entity_owner"),
            User::new(99, "root").with_admin(true),
        ] {
            assert!(
                policy
                    .can_edit_extender(
                        ExtenderKind::Annotation,
                        &annotation,
                        Some(&entity),
                        Some(&user)
                    )
                    .await,
                "{} should be able to edit",
                user.username
            );
        }

        let stranger = User::new(8, "stranger");
        assert!(
            !policy
                .can_edit_extender(
                    ExtenderKind::Annotation,
                    &annotation,
                    Some(&entity),
                    Some(&stranger)
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_banned_owner_cannot_edit() {
        let policy = DefaultAccessPolicy::new();
        let user = User::new(7, "author").with_banned(true);
        assert!(
            !policy
                .can_edit_extender(ExtenderKind::Annotation, &attached(7), None, Some(&user))
                .await
        );
    }

    #[tokio::test]
    async fn test_unowned_metadata_needs_entity_rights() {
        let policy = DefaultAccessPolicy::new();
        let entity = EntityRef::new(42, 1, "object");
        let nobody_owns = attached(0);

        let stranger = User::new(0, "guest");
        assert!(
            !policy
                .can_edit_extender(
                    ExtenderKind::Metadata,
                    &nobody_owns,
                    Some(&entity),
                    Some(&stranger)
                )
                .await
        );
        assert!(
            policy
                .can_edit_extender(
                    ExtenderKind::Metadata,
                    &nobody_owns,
                    Some(&entity),
                    Some(&User::new(1, "entity_owner"))
                )
                .await
        );
    }
}

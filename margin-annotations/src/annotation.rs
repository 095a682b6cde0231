//! Annotations - comments, ratings and likes attached to entities

use crate::capability::{
    can_edit_attributes, delete_attributes, load_attributes, load_entity, load_owner,
    save_attributes, set_enabled, Accessible, Extender, Persistable,
};
use crate::extender::{
    AccessLevel, ExtenderAttributes, ExtenderId, ExtenderKind, ExtenderRecord, ExtenderValue,
};
use crate::river::RiverFilter;
use crate::services::ExtenderServices;
use async_trait::async_trait;
use margin_core::{EntityRef, Guid, MarginResult, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A named value a user attaches to an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    attributes: ExtenderAttributes,
}

impl Annotation {
    /// An unsaved, empty annotation
    pub fn new() -> Self {
        Self::default()
    }

    /// An unsaved annotation with everything a save needs
    pub fn attach(
        entity_guid: Guid,
        name: impl Into<String>,
        value: impl Into<ExtenderValue>,
        owner_guid: Guid,
        access: AccessLevel,
    ) -> Self {
        let mut attributes = ExtenderAttributes {
            entity_guid,
            owner_guid,
            name: name.into(),
            access,
            ..ExtenderAttributes::default()
        };
        attributes.set_value(value);
        Self { attributes }
    }

    /// Hydrate from a persisted row
    pub fn from_record(record: ExtenderRecord) -> MarginResult<Self> {
        Ok(Self {
            attributes: ExtenderAttributes::try_from(record)?,
        })
    }

    /// Hydrate from a row given as JSON, as a query layer would hand it over
    pub fn from_json(row: serde_json::Value) -> MarginResult<Self> {
        let record: ExtenderRecord = serde_json::from_value(row)?;
        Self::from_record(record)
    }

    /// Load by id. `None` when the row does not exist.
    pub async fn object_from_id(
        services: &ExtenderServices,
        id: ExtenderId,
    ) -> MarginResult<Option<Self>> {
        Ok(load_attributes(ExtenderKind::Annotation, id, services)
            .await?
            .map(|attributes| Self { attributes }))
    }

    /// Every annotation on an entity, oldest first
    pub async fn for_entity(
        services: &ExtenderServices,
        entity_guid: Guid,
    ) -> MarginResult<Vec<Self>> {
        services
            .repository
            .list_for_entity(ExtenderKind::Annotation, entity_guid)
            .await?
            .into_iter()
            .map(Self::from_record)
            .collect()
    }

    pub fn entity_guid(&self) -> Guid {
        self.attributes.entity_guid
    }

    pub fn owner_guid(&self) -> Guid {
        self.attributes.owner_guid
    }

    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn value(&self) -> &str {
        &self.attributes.value
    }

    pub fn typed_value(&self) -> ExtenderValue {
        self.attributes.typed_value()
    }

    pub fn access(&self) -> AccessLevel {
        self.attributes.access
    }

    pub fn is_enabled(&self) -> bool {
        self.attributes.enabled
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.attributes.name = name.into();
    }

    pub fn set_value(&mut self, value: impl Into<ExtenderValue>) {
        self.attributes.set_value(value);
    }

    pub fn set_owner_guid(&mut self, owner_guid: Guid) {
        self.attributes.owner_guid = owner_guid;
    }

    pub fn set_access(&mut self, access: AccessLevel) {
        self.attributes.access = access;
    }

    /// The entity this annotation is attached to
    pub async fn entity(&self, services: &ExtenderServices) -> Option<EntityRef> {
        load_entity(&self.attributes, services).await
    }

    /// The user who wrote this annotation
    pub async fn owner(&self, services: &ExtenderServices) -> Option<User> {
        load_owner(&self.attributes, services).await
    }
}

impl Extender for Annotation {
    fn kind(&self) -> ExtenderKind {
        ExtenderKind::Annotation
    }

    fn attributes(&self) -> &ExtenderAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut ExtenderAttributes {
        &mut self.attributes
    }
}

#[async_trait]
impl Persistable for Annotation {
    async fn save(&mut self, services: &ExtenderServices) -> MarginResult<ExtenderId> {
        save_attributes(ExtenderKind::Annotation, &mut self.attributes, services).await
    }

    /// Remove the row and every river item that reports on it
    async fn delete(&mut self, services: &ExtenderServices) -> bool {
        let deleted = delete_attributes(ExtenderKind::Annotation, &self.attributes, services).await;

        if deleted {
            match services
                .river
                .delete_entries(&RiverFilter::for_annotation(self.attributes.id))
                .await
            {
                Ok(removed) => debug!(
                    annotation_id = self.attributes.id,
                    removed, "Removed river items for annotation"
                ),
                Err(e) => e.log(),
            }
            info!(annotation_id = self.attributes.id, "Deleted annotation");
        }

        deleted
    }

    async fn disable(&mut self, services: &ExtenderServices) -> bool {
        set_enabled(ExtenderKind::Annotation, &mut self.attributes, false, services).await
    }

    async fn enable(&mut self, services: &ExtenderServices) -> bool {
        set_enabled(ExtenderKind::Annotation, &mut self.attributes, true, services).await
    }
}

#[async_trait]
impl Accessible for Annotation {
    async fn can_edit(&self, services: &ExtenderServices, user_guid: Option<Guid>) -> bool {
        can_edit_attributes(ExtenderKind::Annotation, &self.attributes, services, user_guid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::ValueType;
    use crate::repository::{ExtenderRepository, MemoryExtenderRepository};
    use crate::river::{MemoryRiverStore, RiverEntry, RiverStore};
    use margin_core::{storage_error, MarginError, MemoryDirectory};
    use std::sync::Arc;

    /// Repository whose inserts never produce an id
    struct NoIdRepository;

    #[async_trait]
    impl ExtenderRepository for NoIdRepository {
        async fn create(
            &self,
            _kind: ExtenderKind,
            _fields: &crate::extender::ExtenderFields,
        ) -> MarginResult<Option<ExtenderId>> {
            Ok(None)
        }

        async fn update(
            &self,
            _kind: ExtenderKind,
            _id: ExtenderId,
            _fields: &crate::extender::ExtenderFields,
        ) -> MarginResult<bool> {
            Ok(false)
        }

        async fn delete_by_id(&self, _kind: ExtenderKind, _id: ExtenderId) -> MarginResult<bool> {
            Err(storage_error!("disk unplugged", "test"))
        }

        async fn set_enabled(
            &self,
            _kind: ExtenderKind,
            _id: ExtenderId,
            _enabled: bool,
        ) -> MarginResult<bool> {
            Err(storage_error!("disk unplugged", "test"))
        }

        async fn lookup(
            &self,
            _kind: ExtenderKind,
            _id: ExtenderId,
        ) -> MarginResult<Option<ExtenderRecord>> {
            Ok(None)
        }

        async fn list_for_entity(
            &self,
            _kind: ExtenderKind,
            _entity_guid: Guid,
        ) -> MarginResult<Vec<ExtenderRecord>> {
            Ok(Vec::new())
        }
    }

    fn services() -> (ExtenderServices, MemoryRiverStore) {
        let river = MemoryRiverStore::new();
        let services = ExtenderServices::new(
            Arc::new(MemoryExtenderRepository::new()),
            Arc::new(river.clone()),
            MemoryDirectory::new(),
        );
        (services, river)
    }

    #[tokio::test]
    async fn test_new_annotation_is_empty() {
        let annotation = Annotation::new();
        assert_eq!(annotation.id(), 0);
        assert_eq!(annotation.kind(), ExtenderKind::Annotation);
        assert_eq!(annotation.name(), "");
        assert!(annotation.is_enabled());
    }

    #[tokio::test]
    async fn test_save_inserts_then_updates_same_row() {
        let (services, _) = services();
        let mut annotation = Annotation::attach(42, "rating", 4, 7, AccessLevel::Public);

        let id = annotation.save(&services).await.unwrap();
        assert!(id > 0);
        assert_eq!(annotation.id(), id);

        annotation.set_value(5);
        assert_eq!(annotation.save(&services).await.unwrap(), id);

        let loaded = Annotation::object_from_id(&services, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.value(), "5");
        assert_eq!(loaded.attributes().value_type, ValueType::Integer);
    }

    #[tokio::test]
    async fn test_insert_without_id_is_a_storage_error() {
        let (mut services, _) = services();
        services.repository = Arc::new(NoIdRepository);

        let mut annotation = Annotation::attach(42, "rating", 5, 7, AccessLevel::Public);
        let err = annotation.save(&services).await.unwrap_err();
        assert!(err.is_storage());
        assert_eq!(annotation.id(), 0);
    }

    #[tokio::test]
    async fn test_update_of_vanished_row_is_a_storage_error() {
        let (services, _) = services();
        let mut annotation = Annotation::attach(42, "rating", 5, 7, AccessLevel::Public);
        annotation.attributes_mut().id = 99;

        assert!(annotation.save(&services).await.unwrap_err().is_storage());
    }

    #[tokio::test]
    async fn test_unattached_annotation_rejected() {
        let (services, _) = services();
        let mut annotation = Annotation::new();
        annotation.set_name("rating");

        assert!(matches!(
            annotation.save(&services).await,
            Err(MarginError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_takes_river_items_along() {
        let (services, river) = services();
        let mut annotation = Annotation::attach(42, "generic_comment", "Nice", 7, AccessLevel::Public);
        let id = annotation.save(&services).await.unwrap();

        river
            .add_entry(RiverEntry::new("comment", 7, 42).with_annotation(id))
            .await
            .unwrap();
        river
            .add_entry(RiverEntry::new("create", 7, 42))
            .await
            .unwrap();

        assert!(annotation.delete(&services).await);
        assert_eq!(river.len().await, 1);
        assert!(Annotation::object_from_id(&services, id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_storage_failures_become_false() {
        let (mut services, river) = services();
        services.repository = Arc::new(NoIdRepository);
        river
            .add_entry(RiverEntry::new("comment", 7, 42).with_annotation(3))
            .await
            .unwrap();

        let mut annotation = Annotation::attach(42, "rating", 5, 7, AccessLevel::Public);
        annotation.attributes_mut().id = 3;

        assert!(!annotation.delete(&services).await);
        assert!(!annotation.disable(&services).await);
        assert!(annotation.is_enabled());
        // A failed delete leaves the river alone.
        assert_eq!(river.len().await, 1);
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let (services, _) = services();
        let mut annotation = Annotation::attach(42, "likes", "likes", 7, AccessLevel::LoggedIn);
        let id = annotation.save(&services).await.unwrap();

        assert!(annotation.disable(&services).await);
        assert!(!annotation.is_enabled());
        let stored = services
            .repository
            .lookup(ExtenderKind::Annotation, id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_enabled());

        assert!(annotation.enable(&services).await);
        assert!(annotation.is_enabled());
    }

    #[tokio::test]
    async fn test_unsaved_annotation_cannot_be_disabled() {
        let (services, _) = services();
        let mut annotation = Annotation::attach(42, "rating", 5, 7, AccessLevel::Public);
        assert!(!annotation.disable(&services).await);
    }
}

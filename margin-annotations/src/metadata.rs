//! Metadata - named values that describe an entity

use crate::capability::{
    can_edit_attributes, delete_attributes, load_attributes, load_entity, load_owner,
    save_attributes, set_enabled, Accessible, Extender, Persistable,
};
use crate::extender::{
    AccessLevel, ExtenderAttributes, ExtenderId, ExtenderKind, ExtenderRecord, ExtenderValue,
};
use crate::services::ExtenderServices;
use async_trait::async_trait;
use margin_core::{EntityRef, Guid, MarginResult, User};
use serde::{Deserialize, Serialize};

/// Metadata shares the annotation attribute set but never appears in the river
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    attributes: ExtenderAttributes,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

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

    pub fn from_record(record: ExtenderRecord) -> MarginResult<Self> {
        Ok(Self {
            attributes: ExtenderAttributes::try_from(record)?,
        })
    }

    pub async fn object_from_id(
        services: &ExtenderServices,
        id: ExtenderId,
    ) -> MarginResult<Option<Self>> {
        Ok(load_attributes(ExtenderKind::Metadata, id, services)
            .await?
            .map(|attributes| Self { attributes }))
    }

    pub async fn for_entity(
        services: &ExtenderServices,
        entity_guid: Guid,
    ) -> MarginResult<Vec<Self>> {
        services
            .repository
            .list_for_entity(ExtenderKind::Metadata, entity_guid)
            .await?
            .into_iter()
            .map(Self::from_record)
            .collect()
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

    pub fn set_value(&mut self, value: impl Into<ExtenderValue>) {
        self.attributes.set_value(value);
    }

    pub async fn entity(&self, services: &ExtenderServices) -> Option<EntityRef> {
        load_entity(&self.attributes, services).await
    }

    pub async fn owner(&self, services: &ExtenderServices) -> Option<User> {
        load_owner(&self.attributes, services).await
    }
}

impl Extender for Metadata {
    fn kind(&self) -> ExtenderKind {
        ExtenderKind::Metadata
    }

    fn attributes(&self) -> &ExtenderAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut ExtenderAttributes {
        &mut self.attributes
    }
}

#[async_trait]
impl Persistable for Metadata {
    async fn save(&mut self, services: &ExtenderServices) -> MarginResult<ExtenderId> {
        save_attributes(ExtenderKind::Metadata, &mut self.attributes, services).await
    }

    async fn delete(&mut self, services: &ExtenderServices) -> bool {
        delete_attributes(ExtenderKind::Metadata, &self.attributes, services).await
    }

    async fn disable(&mut self, services: &ExtenderServices) -> bool {
        set_enabled(ExtenderKind::Metadata, &mut self.attributes, false, services).await
    }

    async fn enable(&mut self, services: &ExtenderServices) -> bool {
        set_enabled(ExtenderKind::Metadata, &mut self.attributes, true, services).await
    }
}

#[async_trait]
impl Accessible for Metadata {
    async fn can_edit(&self, services: &ExtenderServices, user_guid: Option<Guid>) -> bool {
        can_edit_attributes(ExtenderKind::Metadata, &self.attributes, services, user_guid).await
    }
}

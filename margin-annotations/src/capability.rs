//! Capabilities shared by annotations and metadata
//!
//! Both kinds persist the same way and answer the same edit question; they are
//! written once here over [`ExtenderAttributes`] and [`ExtenderKind`].

use crate::extender::{ExtenderAttributes, ExtenderId, ExtenderKind};
use crate::services::ExtenderServices;
use async_trait::async_trait;
use margin_core::{
    log_operation_error, log_operation_start, log_operation_success, storage_error, EntityRef,
    Guid, MarginResult, User,
};
use tracing::warn;

/// Something that can be written to and removed from storage
#[async_trait]
pub trait Persistable: Send + Sync {
    /// Insert when unsaved, update otherwise. Returns the record id.
    async fn save(&mut self, services: &ExtenderServices) -> MarginResult<ExtenderId>;

    async fn delete(&mut self, services: &ExtenderServices) -> bool;

    async fn disable(&mut self, services: &ExtenderServices) -> bool;

    async fn enable(&mut self, services: &ExtenderServices) -> bool;
}

/// Something with an edit permission
#[async_trait]
pub trait Accessible: Send + Sync {
    /// `None` asks about the logged-in user
    async fn can_edit(&self, services: &ExtenderServices, user_guid: Option<Guid>) -> bool;
}

/// Read access to the attribute set and its family
pub trait Extender {
    fn kind(&self) -> ExtenderKind;

    fn attributes(&self) -> &ExtenderAttributes;

    fn attributes_mut(&mut self) -> &mut ExtenderAttributes;

    fn id(&self) -> ExtenderId {
        self.attributes().id
    }

    /// The record's name, which doubles as its subtype
    fn subtype(&self) -> &str {
        &self.attributes().name
    }

    /// Key under which system log rows refer to this record
    fn system_log_id(&self) -> ExtenderId {
        self.attributes().id
    }
}

pub(crate) async fn save_attributes(
    kind: ExtenderKind,
    attributes: &mut ExtenderAttributes,
    services: &ExtenderServices,
) -> MarginResult<ExtenderId> {
    let operation = format!("{}_save", kind);
    log_operation_start!(operation.as_str(), id = attributes.id, name = %attributes.name);

    if attributes.id > 0 {
        let updated = services
            .repository
            .update(kind, attributes.id, &attributes.fields())
            .await?;
        if !updated {
            let err = storage_error!(
                format!("{} {} no longer exists", kind, attributes.id),
                kind.as_str()
            );
            log_operation_error!(operation.as_str(), err);
            return Err(err);
        }
        log_operation_success!(operation.as_str(), id = attributes.id);
        return Ok(attributes.id);
    }

    attributes.validate_for_insert(kind.as_str())?;

    match services.repository.create(kind, &attributes.fields()).await? {
        Some(id) if id > 0 => {
            attributes.id = id;
            attributes.enabled = true;
            log_operation_success!(operation.as_str(), id, entity_guid = attributes.entity_guid);
            Ok(id)
        }
        _ => {
            let err = storage_error!(
                format!("Unable to save new {}: no id was assigned", kind),
                kind.as_str()
            );
            log_operation_error!(operation.as_str(), err);
            Err(err)
        }
    }
}

pub(crate) async fn delete_attributes(
    kind: ExtenderKind,
    attributes: &ExtenderAttributes,
    services: &ExtenderServices,
) -> bool {
    match services.repository.delete_by_id(kind, attributes.id).await {
        Ok(deleted) => deleted,
        Err(e) => {
            e.log();
            false
        }
    }
}

pub(crate) async fn set_enabled(
    kind: ExtenderKind,
    attributes: &mut ExtenderAttributes,
    enabled: bool,
    services: &ExtenderServices,
) -> bool {
    if attributes.id <= 0 {
        warn!("Cannot change enabled state of an unsaved {}", kind);
        return false;
    }

    match services
        .repository
        .set_enabled(kind, attributes.id, enabled)
        .await
    {
        Ok(true) => {
            attributes.enabled = enabled;
            true
        }
        Ok(false) => false,
        Err(e) => {
            e.log();
            false
        }
    }
}

pub(crate) async fn can_edit_attributes(
    kind: ExtenderKind,
    attributes: &ExtenderAttributes,
    services: &ExtenderServices,
    user_guid: Option<Guid>,
) -> bool {
    let user = services.resolve_user(user_guid).await;
    let entity = load_entity(attributes, services).await;
    services
        .policy
        .can_edit_extender(kind, attributes, entity.as_ref(), user.as_ref())
        .await
}

pub(crate) async fn load_entity(
    attributes: &ExtenderAttributes,
    services: &ExtenderServices,
) -> Option<EntityRef> {
    match services.entities.get_entity(attributes.entity_guid).await {
        Ok(entity) => entity,
        Err(e) => {
            e.log();
            None
        }
    }
}

pub(crate) async fn load_owner(
    attributes: &ExtenderAttributes,
    services: &ExtenderServices,
) -> Option<User> {
    match services.users.get_user(attributes.owner_guid).await {
        Ok(user) => user,
        Err(e) => {
            e.log();
            None
        }
    }
}

pub(crate) async fn load_attributes(
    kind: ExtenderKind,
    id: ExtenderId,
    services: &ExtenderServices,
) -> MarginResult<Option<ExtenderAttributes>> {
    match services.repository.lookup(kind, id).await? {
        Some(record) => Ok(Some(ExtenderAttributes::try_from(record)?)),
        None => Ok(None),
    }
}

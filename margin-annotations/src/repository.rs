//! Extender persistence
//!
//! Annotations and metadata live in separate tables with the same shape, so a
//! single repository serves both and is addressed by [`ExtenderKind`].

use crate::extender::{ExtenderFields, ExtenderId, ExtenderKind, ExtenderRecord};
use async_trait::async_trait;
use margin_core::{Guid, MarginResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for annotation and metadata rows
#[async_trait]
pub trait ExtenderRepository: Send + Sync {
    /// Insert a new row. `None` means the store did not assign an id.
    async fn create(
        &self,
        kind: ExtenderKind,
        fields: &ExtenderFields,
    ) -> MarginResult<Option<ExtenderId>>;

    /// Rewrite name, value, type, owner and access of an existing row.
    /// Returns false when no row has that id.
    async fn update(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        fields: &ExtenderFields,
    ) -> MarginResult<bool>;

    async fn delete_by_id(&self, kind: ExtenderKind, id: ExtenderId) -> MarginResult<bool>;

    async fn set_enabled(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        enabled: bool,
    ) -> MarginResult<bool>;

    async fn lookup(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
    ) -> MarginResult<Option<ExtenderRecord>>;

    /// Rows attached to an entity, oldest first
    async fn list_for_entity(
        &self,
        kind: ExtenderKind,
        entity_guid: Guid,
    ) -> MarginResult<Vec<ExtenderRecord>>;
}

/// In-memory extender storage
#[derive(Clone, Default)]
pub struct MemoryExtenderRepository {
    tables: Arc<RwLock<HashMap<ExtenderKind, BTreeMap<ExtenderId, ExtenderRecord>>>>,
    next_id: Arc<RwLock<HashMap<ExtenderKind, ExtenderId>>>,
}

impl MemoryExtenderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record in place as-is, keeping its id
    pub async fn insert_record(&self, kind: ExtenderKind, record: ExtenderRecord) {
        let mut next_id = self.next_id.write().await;
        let next = next_id.entry(kind).or_insert(1);
        if record.id >= *next {
            *next = record.id + 1;
        }
        self.tables
            .write()
            .await
            .entry(kind)
            .or_default()
            .insert(record.id, record);
    }

    pub async fn count(&self, kind: ExtenderKind) -> usize {
        self.tables
            .read()
            .await
            .get(&kind)
            .map_or(0, |table| table.len())
    }
}

#[async_trait]
impl ExtenderRepository for MemoryExtenderRepository {
    async fn create(
        &self,
        kind: ExtenderKind,
        fields: &ExtenderFields,
    ) -> MarginResult<Option<ExtenderId>> {
        let id = {
            let mut next_id = self.next_id.write().await;
            let next = next_id.entry(kind).or_insert(1);
            let id = *next;
            *next += 1;
            id
        };

        self.tables
            .write()
            .await
            .entry(kind)
            .or_default()
            .insert(id, ExtenderRecord::from_fields(id, fields));

        debug!("Created {} {} in memory storage", kind, id);
        Ok(Some(id))
    }

    async fn update(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        fields: &ExtenderFields,
    ) -> MarginResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.get_mut(&kind).and_then(|table| table.get_mut(&id)) else {
            return Ok(false);
        };

        record.name = fields.name.clone();
        record.value = fields.value.clone();
        record.value_type = fields.value_type.as_str().to_string();
        record.owner_guid = fields.owner_guid;
        record.access_id = fields.access.id();
        Ok(true)
    }

    async fn delete_by_id(&self, kind: ExtenderKind, id: ExtenderId) -> MarginResult<bool> {
        let removed = self
            .tables
            .write()
            .await
            .get_mut(&kind)
            .and_then(|table| table.remove(&id))
            .is_some();
        if removed {
            debug!("Deleted {} {} from memory storage", kind, id);
        }
        Ok(removed)
    }

    async fn set_enabled(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        enabled: bool,
    ) -> MarginResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.get_mut(&kind).and_then(|table| table.get_mut(&id)) {
            Some(record) => {
                record.enabled = if enabled { "yes" } else { "no" }.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lookup(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
    ) -> MarginResult<Option<ExtenderRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .get(&kind)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn list_for_entity(
        &self,
        kind: ExtenderKind,
        entity_guid: Guid,
    ) -> MarginResult<Vec<ExtenderRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&kind)
            .map(|table| {
                table
                    .values()
                    .filter(|record| record.entity_guid == entity_guid)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::{AccessLevel, ExtenderAttributes, ValueType};

    fn rating() -> ExtenderFields {
        let mut attributes = ExtenderAttributes {
            entity_guid: 42,
            owner_guid: 7,
            name: "rating".to_string(),
            access: AccessLevel::Public,
            ..ExtenderAttributes::default()
        };
        attributes.set_value(5);
        attributes.fields()
    }

    #[tokio::test]
    async fn test_kinds_have_separate_id_sequences() {
        let repo = MemoryExtenderRepository::new();
        let a = repo.create(ExtenderKind::Annotation, &rating()).await.unwrap();
        let m = repo.create(ExtenderKind::Metadata, &rating()).await.unwrap();
        assert_eq!(a, Some(1));
        assert_eq!(m, Some(1));
        assert_eq!(repo.count(ExtenderKind::Annotation).await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_entity_and_enabled_flag() {
        let repo = MemoryExtenderRepository::new();
        let id = repo
            .create(ExtenderKind::Annotation, &rating())
            .await
            .unwrap()
            .unwrap();
        repo.set_enabled(ExtenderKind::Annotation, id, false)
            .await
            .unwrap();

        let mut changed = rating();
        changed.entity_guid = 99;
        changed.value = "great".to_string();
        changed.value_type = ValueType::Text;
        assert!(repo
            .update(ExtenderKind::Annotation, id, &changed)
            .await
            .unwrap());

        let record = repo
            .lookup(ExtenderKind::Annotation, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.entity_guid, 42);
        assert_eq!(record.value, "great");
        assert_eq!(record.value_type, "text");
        assert_eq!(record.enabled, "no");
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let repo = MemoryExtenderRepository::new();
        assert!(!repo
            .update(ExtenderKind::Metadata, 5, &rating())
            .await
            .unwrap());
        assert!(!repo.delete_by_id(ExtenderKind::Metadata, 5).await.unwrap());
        assert!(!repo
            .set_enabled(ExtenderKind::Metadata, 5, true)
            .await
            .unwrap());
        assert!(repo.lookup(ExtenderKind::Metadata, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inserted_records_advance_sequence() {
        let repo = MemoryExtenderRepository::new();
        repo.insert_record(
            ExtenderKind::Annotation,
            ExtenderRecord::from_fields(10, &rating()),
        )
        .await;
        let id = repo.create(ExtenderKind::Annotation, &rating()).await.unwrap();
        assert_eq!(id, Some(11));
        assert_eq!(
            repo.list_for_entity(ExtenderKind::Annotation, 42)
                .await
                .unwrap()
                .len(),
            2
        );
    }
}

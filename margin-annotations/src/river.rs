//! Activity stream ("river") entries and their removal

use crate::extender::ExtenderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use margin_core::{Guid, MarginResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One activity stream item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiverEntry {
    pub id: i64,
    pub action_type: String,
    pub subject_guid: Guid,
    pub object_guid: Guid,
    /// Annotation this item reports on, `0` for none
    pub annotation_id: ExtenderId,
    pub posted: DateTime<Utc>,
}

impl RiverEntry {
    pub fn new(action_type: impl Into<String>, subject_guid: Guid, object_guid: Guid) -> Self {
        Self {
            id: 0,
            action_type: action_type.into(),
            subject_guid,
            object_guid,
            annotation_id: 0,
            posted: Utc::now(),
        }
    }

    pub fn with_annotation(mut self, annotation_id: ExtenderId) -> Self {
        self.annotation_id = annotation_id;
        self
    }
}

/// Selects river entries. An empty filter matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiverFilter {
    pub annotation_id: Option<ExtenderId>,
    pub subject_guid: Option<Guid>,
    pub object_guid: Option<Guid>,
    /// `None` removes every match
    pub limit: Option<usize>,
}

impl RiverFilter {
    /// Every entry referencing an annotation
    pub fn for_annotation(annotation_id: ExtenderId) -> Self {
        Self {
            annotation_id: Some(annotation_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.annotation_id.is_none() && self.subject_guid.is_none() && self.object_guid.is_none()
    }

    pub fn matches(&self, entry: &RiverEntry) -> bool {
        !self.is_empty()
            && self.annotation_id.map_or(true, |id| entry.annotation_id == id)
            && self.subject_guid.map_or(true, |guid| entry.subject_guid == guid)
            && self.object_guid.map_or(true, |guid| entry.object_guid == guid)
    }
}

#[async_trait]
pub trait RiverStore: Send + Sync {
    /// Append an entry and return its id
    async fn add_entry(&self, entry: RiverEntry) -> MarginResult<i64>;

    async fn entries(&self, filter: &RiverFilter) -> MarginResult<Vec<RiverEntry>>;

    /// Delete matching entries and return how many went
    async fn delete_entries(&self, filter: &RiverFilter) -> MarginResult<u64>;
}

/// In-memory river
#[derive(Clone, Default)]
pub struct MemoryRiverStore {
    entries: Arc<RwLock<Vec<RiverEntry>>>,
    /// Last id handed out; ids are never reused
    last_id: Arc<AtomicI64>,
}

impl MemoryRiverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RiverStore for MemoryRiverStore {
    async fn add_entry(&self, mut entry: RiverEntry) -> MarginResult<i64> {
        let mut entries = self.entries.write().await;
        entry.id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = entry.id;
        entries.push(entry);
        Ok(id)
    }

    async fn entries(&self, filter: &RiverFilter) -> MarginResult<Vec<RiverEntry>> {
        let entries = self.entries.read().await;
        let matching = entries.iter().filter(|entry| filter.matches(entry)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn delete_entries(&self, filter: &RiverFilter) -> MarginResult<u64> {
        let mut entries = self.entries.write().await;
        let mut budget = filter.limit.unwrap_or(usize::MAX);
        let before = entries.len();

        entries.retain(|entry| {
            if budget > 0 && filter.matches(entry) {
                budget -= 1;
                false
            } else {
                true
            }
        });

        let removed = (before - entries.len()) as u64;
        debug!("Removed {} river entries", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryRiverStore {
        let river = MemoryRiverStore::new();
        for _ in 0..3 {
            river
                .add_entry(RiverEntry::new("comment", 7, 42).with_annotation(5))
                .await
                .unwrap();
        }
        river
            .add_entry(RiverEntry::new("create", 7, 42))
            .await
            .unwrap();
        river
    }

    #[tokio::test]
    async fn test_unlimited_delete_removes_every_match() {
        let river = seeded().await;
        let removed = river
            .delete_entries(&RiverFilter::for_annotation(5))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(river.len().await, 1);
    }

    #[tokio::test]
    async fn test_limited_delete() {
        let river = seeded().await;
        let filter = RiverFilter {
            limit: Some(2),
            ..RiverFilter::for_annotation(5)
        };
        assert_eq!(river.delete_entries(&filter).await.unwrap(), 2);
        assert_eq!(river.len().await, 2);
    }

    #[tokio::test]
    async fn test_empty_filter_deletes_nothing() {
        let river = seeded().await;
        assert_eq!(
            river.delete_entries(&RiverFilter::default()).await.unwrap(),
            0
        );
        assert_eq!(river.len().await, 4);
    }

    #[tokio::test]
    async fn test_entries_by_object() {
        let river = seeded().await;
        let filter = RiverFilter {
            object_guid: Some(42),
            ..RiverFilter::default()
        };
        assert_eq!(river.entries(&filter).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let river = seeded().await;
        let newest = RiverFilter {
            annotation_id: Some(0),
            object_guid: Some(42),
            ..RiverFilter::default()
        };
        let removed = river.entries(&newest).await.unwrap();
        assert_eq!(removed[0].id, 4);
        assert_eq!(river.delete_entries(&newest).await.unwrap(), 1);

        let id = river
            .add_entry(RiverEntry::new("create", 7, 43))
            .await
            .unwrap();
        assert_eq!(id, 5);
        assert_eq!(river.clone().add_entry(RiverEntry::new("like", 7, 43)).await.unwrap(), 6);
    }
}

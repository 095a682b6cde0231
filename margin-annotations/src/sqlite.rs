//! SQLite storage for extenders and the river
//!
//! `annotations` and `metadata` share one column layout. The `enabled` column
//! holds `yes` or `no`.

use crate::extender::{ExtenderFields, ExtenderId, ExtenderKind, ExtenderRecord};
use crate::repository::ExtenderRepository;
use crate::river::{RiverEntry, RiverFilter, RiverStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use margin_core::{storage_error, Guid, MarginError, MarginResult};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, FromRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info};

fn db_error(action: &str, e: sqlx::Error) -> MarginError {
    storage_error!(format!("Failed to {}: {}", action, e), "sqlite_storage", e)
}

fn table(kind: ExtenderKind) -> &'static str {
    match kind {
        ExtenderKind::Annotation => "annotations",
        ExtenderKind::Metadata => "metadata",
    }
}

const EXTENDER_COLUMNS: [&str; 9] = [
    "id",
    "entity_guid",
    "owner_guid",
    "name",
    "value",
    "value_type",
    "access_id",
    "time_created",
    "enabled",
];

#[derive(sqlx::FromRow)]
struct ExtenderRow {
    id: i64,
    entity_guid: i64,
    owner_guid: i64,
    name: String,
    value: String,
    value_type: String,
    access_id: i64,
    time_created: i64,
    enabled: String,
}

impl From<ExtenderRow> for ExtenderRecord {
    fn from(row: ExtenderRow) -> Self {
        Self {
            id: row.id,
            entity_guid: row.entity_guid,
            owner_guid: row.owner_guid,
            name: row.name,
            value: row.value,
            value_type: row.value_type,
            access_id: row.access_id,
            time_created: row.time_created,
            enabled: row.enabled,
            extra: BTreeMap::new(),
        }
    }
}

/// Map a row, carrying any columns beyond the known layout into `extra`
fn record_from_row(row: &SqliteRow) -> Result<ExtenderRecord, sqlx::Error> {
    let mut record = ExtenderRecord::from(ExtenderRow::from_row(row)?);
    for column in row.columns() {
        if EXTENDER_COLUMNS.contains(&column.name()) {
            continue;
        }
        record
            .extra
            .insert(column.name().to_string(), column_value(row, column.ordinal()));
    }
    Ok(record)
}

/// Blobs and NULLs come back as JSON null
fn column_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    row.try_get::<Option<String>, _>(index)
        .ok()
        .flatten()
        .map_or(Value::Null, Value::String)
}

pub struct SqliteExtenderRepository {
    pool: SqlitePool,
}

impl SqliteExtenderRepository {
    /// Create the repository, creating both tables if needed
    pub async fn new(pool: SqlitePool) -> MarginResult<Self> {
        let repository = Self { pool };
        repository.create_tables().await?;
        Ok(repository)
    }

    async fn create_tables(&self) -> MarginResult<()> {
        for kind in [ExtenderKind::Annotation, ExtenderKind::Metadata] {
            let table = table(kind);
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_guid INTEGER NOT NULL,
                    owner_guid INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    value_type TEXT NOT NULL CHECK (value_type IN ('integer', 'text')),
                    access_id INTEGER NOT NULL,
                    time_created INTEGER NOT NULL,
                    enabled TEXT NOT NULL DEFAULT 'yes' CHECK (enabled IN ('yes', 'no'))
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_entity ON {table}(entity_guid);
                "#
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("create extender tables", e))?;
        }

        info!("Extender tables ready");
        Ok(())
    }
}

#[async_trait]
impl ExtenderRepository for SqliteExtenderRepository {
    async fn create(
        &self,
        kind: ExtenderKind,
        fields: &ExtenderFields,
    ) -> MarginResult<Option<ExtenderId>> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {}
            (entity_guid, owner_guid, name, value, value_type, access_id, time_created, enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'yes')
            "#,
            table(kind)
        ))
        .bind(fields.entity_guid)
        .bind(fields.owner_guid)
        .bind(&fields.name)
        .bind(&fields.value)
        .bind(fields.value_type.as_str())
        .bind(fields.access.id())
        .bind(fields.time_created.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert extender", e))?;

        let id = result.last_insert_rowid();
        debug!("Inserted {} {} into SQLite storage", kind, id);
        Ok((id > 0).then_some(id))
    }

    async fn update(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        fields: &ExtenderFields,
    ) -> MarginResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET name = ?, value = ?, value_type = ?, owner_guid = ?, access_id = ?
            WHERE id = ?
            "#,
            table(kind)
        ))
        .bind(&fields.name)
        .bind(&fields.value)
        .bind(fields.value_type.as_str())
        .bind(fields.owner_guid)
        .bind(fields.access.id())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update extender", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, kind: ExtenderKind, id: ExtenderId) -> MarginResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table(kind)))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete extender", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
        enabled: bool,
    ) -> MarginResult<bool> {
        let result = sqlx::query(&format!("UPDATE {} SET enabled = ? WHERE id = ?", table(kind)))
            .bind(if enabled { "yes" } else { "no" })
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("change extender enabled state", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn lookup(
        &self,
        kind: ExtenderKind,
        id: ExtenderId,
    ) -> MarginResult<Option<ExtenderRecord>> {
        let row = sqlx::query(&format!("SELECT * FROM {} WHERE id = ?", table(kind)))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load extender", e))?;

        row.as_ref()
            .map(record_from_row)
            .transpose()
            .map_err(|e| db_error("read extender row", e))
    }

    async fn list_for_entity(
        &self,
        kind: ExtenderKind,
        entity_guid: Guid,
    ) -> MarginResult<Vec<ExtenderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE entity_guid = ? ORDER BY id",
            table(kind)
        ))
        .bind(entity_guid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list extenders", e))?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("read extender row", e))
    }
}

#[derive(sqlx::FromRow)]
struct RiverRow {
    id: i64,
    action_type: String,
    subject_guid: i64,
    object_guid: i64,
    annotation_id: i64,
    posted: i64,
}

impl From<RiverRow> for RiverEntry {
    fn from(row: RiverRow) -> Self {
        Self {
            id: row.id,
            action_type: row.action_type,
            subject_guid: row.subject_guid,
            object_guid: row.object_guid,
            annotation_id: row.annotation_id,
            posted: Utc
                .timestamp_opt(row.posted, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

/// SQLite reads a negative LIMIT as no limit at all
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub struct SqliteRiverStore {
    pool: SqlitePool,
}

impl SqliteRiverStore {
    pub async fn new(pool: SqlitePool) -> MarginResult<Self> {
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> MarginResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS river (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_type TEXT NOT NULL,
                subject_guid INTEGER NOT NULL,
                object_guid INTEGER NOT NULL,
                annotation_id INTEGER NOT NULL DEFAULT 0,
                posted INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_river_annotation ON river(annotation_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create river table", e))?;

        debug!("River table ready");
        Ok(())
    }

    /// Append `WHERE ...` for the filter's criteria
    fn push_conditions(builder: &mut QueryBuilder<'_, Sqlite>, filter: &RiverFilter) {
        let mut separated = builder.separated(" AND ");
        if let Some(id) = filter.annotation_id {
            separated.push("annotation_id = ");
            separated.push_bind_unseparated(id);
        }
        if let Some(guid) = filter.subject_guid {
            separated.push("subject_guid = ");
            separated.push_bind_unseparated(guid);
        }
        if let Some(guid) = filter.object_guid {
            separated.push("object_guid = ");
            separated.push_bind_unseparated(guid);
        }
    }
}

#[async_trait]
impl RiverStore for SqliteRiverStore {
    async fn add_entry(&self, entry: RiverEntry) -> MarginResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO river (action_type, subject_guid, object_guid, annotation_id, posted)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.action_type)
        .bind(entry.subject_guid)
        .bind(entry.object_guid)
        .bind(entry.annotation_id)
        .bind(entry.posted.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert river entry", e))?;

        Ok(result.last_insert_rowid())
    }

    async fn entries(&self, filter: &RiverFilter) -> MarginResult<Vec<RiverEntry>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM river WHERE ");
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY id");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(sql_limit(limit));
        }

        let rows: Vec<RiverRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list river entries", e))?;

        Ok(rows.into_iter().map(RiverEntry::from).collect())
    }

    async fn delete_entries(&self, filter: &RiverFilter) -> MarginResult<u64> {
        if filter.is_empty() {
            return Ok(0);
        }

        // DELETE ... LIMIT is not available in every SQLite build.
        let mut builder =
            QueryBuilder::<Sqlite>::new("DELETE FROM river WHERE id IN (SELECT id FROM river WHERE ");
        Self::push_conditions(&mut builder, filter);
        builder.push(" ORDER BY id");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(sql_limit(limit));
        }
        builder.push(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete river entries", e))?;

        debug!("Removed {} river entries", result.rows_affected());
        Ok(result.rows_affected())
    }
}

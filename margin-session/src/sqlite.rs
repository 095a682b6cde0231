//! Database-backed session persistence
//!
//! Session rows are keyed by id and carry the JSON-encoded attribute map plus
//! the unix timestamp of the last write.

use crate::backend::{validate_session_id, SessionAttributes, SessionBackend};
use crate::error::SessionResult;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteBackend {
    pool: SqlitePool,
    lifetime: Duration,
}

impl SqliteBackend {
    /// Create the backend, creating the `sessions` table if needed
    pub async fn new(pool: SqlitePool, lifetime: Duration) -> SessionResult<Self> {
        let backend = Self { pool, lifetime };
        backend.create_tables().await?;
        Ok(backend)
    }

    async fn create_tables(&self) -> SessionResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                ts INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ts ON sessions(ts);
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Sessions table ready");
        Ok(())
    }

    /// Rows written before this unix time have expired
    fn oldest_live_timestamp(&self) -> i64 {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        Utc::now().timestamp().saturating_sub(lifetime)
    }
}

#[async_trait]
impl SessionBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn read(&self, id: &str) -> SessionResult<Option<SessionAttributes>> {
        validate_session_id(id)?;

        let row = sqlx::query("SELECT data FROM sessions WHERE id = ? AND ts >= ?")
            .bind(id)
            .bind(self.oldest_live_timestamp())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, id: &str, attributes: &SessionAttributes) -> SessionResult<()> {
        validate_session_id(id)?;
        let data = serde_json::to_string(attributes)?;

        sqlx::query("INSERT OR REPLACE INTO sessions (id, data, ts) VALUES (?, ?, ?)")
            .bind(id)
            .bind(data)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn gc(&self) -> SessionResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE ts < ?")
            .bind(self.oldest_live_timestamp())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "Removed expired sessions from database");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_read_destroy() {
        let backend = SqliteBackend::new(memory_pool().await, Duration::from_secs(3600))
            .await
            .unwrap();

        let mut attributes = SessionAttributes::new();
        attributes.insert("msg".to_string(), json!(["saved"]));
        backend.write("s1", &attributes).await.unwrap();

        assert_eq!(backend.read("s1").await.unwrap(), Some(attributes));
        backend.destroy("s1").await.unwrap();
        assert!(backend.read("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible_and_collected() {
        let pool = memory_pool().await;
        let backend = SqliteBackend::new(pool.clone(), Duration::from_secs(60))
            .await
            .unwrap();

        sqlx::query("INSERT INTO sessions (id, data, ts) VALUES ('old', '{}', ?)")
            .bind(Utc::now().timestamp() - 3600)
            .execute(&pool)
            .await
            .unwrap();

        assert!(backend.read("old").await.unwrap().is_none());
        assert_eq!(backend.gc().await.unwrap(), 1);
        assert_eq!(backend.gc().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_lifetime_keeps_sessions_alive() {
        for secs in [u64::MAX, 1u64 << 63] {
            let backend = SqliteBackend::new(memory_pool().await, Duration::from_secs(secs))
                .await
                .unwrap();

            backend.write("live", &SessionAttributes::new()).await.unwrap();
            assert!(backend.read("live").await.unwrap().is_some());
            assert_eq!(backend.gc().await.unwrap(), 0);
            assert!(backend.read("live").await.unwrap().is_some());
        }
    }
}

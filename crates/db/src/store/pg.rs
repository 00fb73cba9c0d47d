use async_trait::async_trait;
use serde_json::Value;

use super::{KvStore, StoreError};
use crate::DbPool;

/// Postgres-backed store over the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = sqlx::query_scalar::<_, Value>("SELECT value FROM kv_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, item: &str) -> Result<usize, StoreError> {
        let len = sqlx::query_scalar::<_, i32>(
            "INSERT INTO kv_entries (key, value, updated_at) \
             VALUES ($1, jsonb_build_array($2::text), NOW()) \
             ON CONFLICT (key) DO UPDATE \
                 SET value = kv_entries.value || jsonb_build_array($2::text), updated_at = NOW() \
             RETURNING jsonb_array_length(value)",
        )
        .bind(key)
        .bind(item)
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(len).unwrap_or_default())
    }

    /// Locks the list row, removes element 0 and returns it in a single
    /// statement. A concurrent pop waits on the row lock and then sees the
    /// shortened list.
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let item = sqlx::query_scalar::<_, Option<String>>(
            "WITH head AS ( \
                 SELECT key, value ->> 0 AS item FROM kv_entries \
                 WHERE key = $1 AND jsonb_typeof(value) = 'array' AND jsonb_array_length(value) > 0 \
                 FOR UPDATE \
             ) \
             UPDATE kv_entries k SET value = k.value - 0, updated_at = NOW() \
             FROM head WHERE k.key = head.key \
             RETURNING head.item",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item.flatten())
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let len = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT CASE WHEN jsonb_typeof(value) = 'array' THEN jsonb_array_length(value) END \
             FROM kv_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match len {
            None => Ok(0),
            Some(None) => Err(StoreError::NotAList {
                key: key.to_string(),
            }),
            Some(Some(n)) => Ok(usize::try_from(n).unwrap_or_default()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}

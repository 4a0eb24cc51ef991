//! Sync cursor persistence

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;

use super::traits::CursorStore;

pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, source_key: &str) -> Result<Option<u64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT last_block FROM sync_cursor WHERE source_key = ?",
        )
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(block,)| block as u64))
    }

    async fn set(&self, source_key: &str, block: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO sync_cursor (source_key, last_block, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (source_key) DO UPDATE SET last_block = ?, updated_at = ?
            "#,
        )
        .bind(source_key)
        .bind(block as i64)
        .bind(&now)
        .bind(block as i64)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

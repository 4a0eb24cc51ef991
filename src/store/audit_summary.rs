//! Daily audit summary persistence

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::domain::DailyAuditSummary;
use crate::error::{EscrowError, Result};

use super::traits::SummaryStore;

pub struct SqliteSummaryStore {
    pool: SqlitePool,
}

impl SqliteSummaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    summary_date: String,
    merkle_root: String,
    entry_count: i64,
    status: String,
    created_at: String,
}

impl SummaryRow {
    fn into_summary(self) -> Result<DailyAuditSummary> {
        let summary_date: NaiveDate = self
            .summary_date
            .parse()
            .map_err(|e| EscrowError::Internal(format!("unparseable summary_date: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| EscrowError::Internal(format!("unparseable created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(DailyAuditSummary {
            summary_date,
            merkle_root: self.merkle_root,
            entry_count: self.entry_count,
            status: self.status,
            created_at,
        })
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn put(&self, summary: &DailyAuditSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_audit_summary
                (summary_date, merkle_root, entry_count, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (summary_date) DO UPDATE SET merkle_root = ?, entry_count = ?
            "#,
        )
        .bind(summary.summary_date.to_string())
        .bind(&summary.merkle_root)
        .bind(summary.entry_count)
        .bind(&summary.status)
        .bind(summary.created_at.to_rfc3339())
        .bind(&summary.merkle_root)
        .bind(summary.entry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, day: NaiveDate) -> Result<Option<DailyAuditSummary>> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT summary_date, merkle_root, entry_count, status, created_at
            FROM daily_audit_summary
            WHERE summary_date = ?
            "#,
        )
        .bind(day.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SummaryRow::into_summary).transpose()
    }
}

//! SQLite activity log

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::domain::{ActivityEntry, ActivityRecord, ActivitySeverity};
use crate::error::{EscrowError, Result};

use super::traits::{ActivityQuery, ActivityStore};

const DEFAULT_QUERY_LIMIT: u32 = 100;

pub struct SqliteActivityStore {
    pool: SqlitePool,
}

impl SqliteActivityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    actor: String,
    actor_role: Option<String>,
    action: String,
    target_kind: Option<String>,
    target_id: Option<String>,
    severity: String,
    tenant: Option<String>,
    region: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityRecord> {
        let severity = ActivitySeverity::parse(&self.severity).ok_or_else(|| {
            EscrowError::Internal(format!("unknown severity: {}", self.severity))
        })?;
        let metadata = match self.metadata {
            Some(text) => Some(
                serde_json::from_str(&text)
                    .map_err(|e| EscrowError::Internal(format!("unparseable metadata: {e}")))?,
            ),
            None => None,
        };
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| EscrowError::Internal(format!("unparseable created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(ActivityRecord {
            id: self.id,
            actor: self.actor,
            actor_role: self.actor_role,
            action: self.action,
            target_kind: self.target_kind,
            target_id: self.target_id,
            severity,
            tenant: self.tenant,
            region: self.region,
            metadata,
            created_at,
        })
    }
}

/// Inclusive start and exclusive end of a UTC day, in the same RFC 3339
/// shape the rows are stored in, so text comparison orders correctly.
fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    let end = start + Duration::days(1);
    (start.to_rfc3339(), end.to_rfc3339())
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn append(&self, entry: &ActivityEntry) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO activity_log
                (actor, actor_role, action, target_kind, target_id,
                 severity, tenant, region, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&entry.actor)
        .bind(&entry.actor_role)
        .bind(&entry.action)
        .bind(&entry.target_kind)
        .bind(&entry.target_id)
        .bind(entry.severity.as_str())
        .bind(&entry.tenant)
        .bind(&entry.region)
        .bind(entry.metadata.as_ref().map(|m| m.to_string()))
        .bind(entry.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn for_day(&self, day: NaiveDate) -> Result<Vec<ActivityRecord>> {
        let (start, end) = day_bounds(day);
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, actor, actor_role, action, target_kind, target_id,
                   severity, tenant, region, metadata, created_at
            FROM activity_log
            WHERE created_at >= ? AND created_at < ?
            ORDER BY id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRow::into_record).collect()
    }

    async fn query(&self, filter: &ActivityQuery) -> Result<Vec<ActivityRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(actor) = &filter.actor {
            clauses.push("actor = ?");
            binds.push(actor.clone());
        }
        if let Some(action) = &filter.action {
            clauses.push("action = ?");
            binds.push(action.clone());
        }
        if let Some(severity) = filter.severity {
            clauses.push("severity = ?");
            binds.push(severity.as_str().to_string());
        }
        if let Some(since) = filter.since {
            clauses.push("created_at >= ?");
            binds.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            clauses.push("created_at < ?");
            binds.push(until.to_rfc3339());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let sql = format!(
            "SELECT id, actor, actor_role, action, target_kind, target_id, \
             severity, tenant, region, metadata, created_at \
             FROM activity_log{where_sql} ORDER BY id DESC LIMIT {limit}"
        );

        let mut query = sqlx::query_as::<_, ActivityRow>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(ActivityRow::into_record).collect()
    }

    async fn cleanup(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(older_than_days as i64)).to_rfc3339();
        let removed = sqlx::query("DELETE FROM activity_log WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed)
    }
}

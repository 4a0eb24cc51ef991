//! SQLite event store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{LedgerEvent, LedgerEventKind, NewLedgerEvent, Wei};
use crate::error::{EscrowError, Result};

use super::traits::{EventStore, UpsertOutcome};

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_name: String,
    tx_hash: String,
    block_number: i64,
    scheme_ledger_id: String,
    milestone_seq: Option<i64>,
    actor: Option<String>,
    beneficiary: Option<String>,
    amount_wei: Option<String>,
    archive_ref: Option<String>,
    observed_at: String,
}

impl EventRow {
    fn into_event(self) -> Result<LedgerEvent> {
        let kind = LedgerEventKind::parse(&self.event_name).ok_or_else(|| {
            EscrowError::Internal(format!("unknown event name: {}", self.event_name))
        })?;
        let amount_wei = match self.amount_wei {
            Some(text) => Some(Wei::from_text(&text)?),
            None => None,
        };
        let observed_at = DateTime::parse_from_rfc3339(&self.observed_at)
            .map_err(|e| EscrowError::Internal(format!("unparseable observed_at: {e}")))?
            .with_timezone(&Utc);

        Ok(LedgerEvent {
            id: self.id,
            kind,
            tx_hash: self.tx_hash,
            block_number: self.block_number as u64,
            scheme_ledger_id: self.scheme_ledger_id,
            milestone_seq: self.milestone_seq.map(|s| s as u64),
            actor: self.actor,
            beneficiary: self.beneficiary,
            amount_wei,
            archive_ref: self.archive_ref,
            observed_at,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn upsert(&self, event: &NewLedgerEvent) -> Result<UpsertOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_event
                (event_name, tx_hash, block_number, scheme_ledger_id, milestone_seq,
                 actor, beneficiary, amount_wei, archive_ref, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tx_hash, event_name, block_number) DO NOTHING
            "#,
        )
        .bind(event.kind.as_str())
        .bind(&event.tx_hash)
        .bind(event.block_number as i64)
        .bind(&event.scheme_ledger_id)
        .bind(event.milestone_seq.map(|s| s as i64))
        .bind(&event.actor)
        .bind(&event.beneficiary)
        .bind(event.amount_wei.map(|w| w.to_string()))
        .bind(&event.archive_ref)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            return Ok(UpsertOutcome::Inserted);
        }

        // A re-observed event may carry the reference an earlier
        // insert was missing. Never overwrite one that is already set.
        if event.archive_ref.is_some() {
            sqlx::query(
                r#"
                UPDATE ledger_event
                SET archive_ref = ?
                WHERE tx_hash = ? AND event_name = ? AND block_number = ?
                  AND archive_ref IS NULL
                "#,
            )
            .bind(&event.archive_ref)
            .bind(&event.tx_hash)
            .bind(event.kind.as_str())
            .bind(event.block_number as i64)
            .execute(&self.pool)
            .await?;
        }

        Ok(UpsertOutcome::Duplicate)
    }

    async fn set_archive_ref(&self, id: i64, archive_ref: &str) -> Result<()> {
        sqlx::query("UPDATE ledger_event SET archive_ref = ? WHERE id = ?")
            .bind(archive_ref)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_archival(&self, limit: u32) -> Result<Vec<LedgerEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_name, tx_hash, block_number, scheme_ledger_id, milestone_seq,
                   actor, beneficiary, amount_wei, archive_ref, observed_at
            FROM ledger_event
            WHERE archive_ref IS NULL
              AND event_name IN ('FundsDeposited', 'PaymentReleased')
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn recent(&self, limit: u32) -> Result<Vec<LedgerEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_name, tx_hash, block_number, scheme_ledger_id, milestone_seq,
                   actor, beneficiary, amount_wei, archive_ref, observed_at
            FROM ledger_event
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn for_scheme(&self, scheme_ledger_id: &str, limit: u32) -> Result<Vec<LedgerEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_name, tx_hash, block_number, scheme_ledger_id, milestone_seq,
                   actor, beneficiary, amount_wei, archive_ref, observed_at
            FROM ledger_event
            WHERE scheme_ledger_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(scheme_ledger_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}

//! Storage traits
//!
//! Each persistence seam is a trait so the coordinator, sync engine,
//! and audit builder can be exercised against mocks.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    ActivityEntry, ActivityRecord, ActivitySeverity, DailyAuditSummary, LedgerEvent,
    NewLedgerEvent,
};
use crate::error::Result;

/// Outcome of an event upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First observation; a new row was written.
    Inserted,
    /// The (tx hash, event name, block number) key already existed.
    Duplicate,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an observed event, deduplicating on the
    /// (tx_hash, event_name, block_number) key. A duplicate observation
    /// may still backfill a missing archive reference.
    async fn upsert(&self, event: &NewLedgerEvent) -> Result<UpsertOutcome>;

    /// Attach an object-storage reference to a stored event.
    async fn set_archive_ref(&self, id: i64, archive_ref: &str) -> Result<()>;

    /// Archivable events still waiting for an object-storage reference,
    /// oldest first.
    async fn pending_archival(&self, limit: u32) -> Result<Vec<LedgerEvent>>;

    /// Most recent events across all schemes, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<LedgerEvent>>;

    /// Most recent events for one scheme, newest first.
    async fn for_scheme(&self, scheme_ledger_id: &str, limit: u32) -> Result<Vec<LedgerEvent>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last block already ingested for the given source, if any run has
    /// completed before.
    async fn get(&self, source_key: &str) -> Result<Option<u64>>;

    async fn set(&self, source_key: &str, block: u64) -> Result<()>;
}

/// Filters for activity-log queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub severity: Option<ActivitySeverity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> Result<i64>;

    /// Every entry whose timestamp falls on the given UTC day, ordered
    /// by id ascending. This ordering is what the audit trail hashes.
    async fn for_day(&self, day: NaiveDate) -> Result<Vec<ActivityRecord>>;

    /// Filtered view, newest first.
    async fn query(&self, filter: &ActivityQuery) -> Result<Vec<ActivityRecord>>;

    /// Delete entries older than the retention window. Returns the
    /// number of rows removed.
    async fn cleanup(&self, older_than_days: u32) -> Result<u64>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert or refresh the summary for its date. A rebuild replaces
    /// the root and entry count but leaves the status alone.
    async fn put(&self, summary: &DailyAuditSummary) -> Result<()>;

    async fn get(&self, day: NaiveDate) -> Result<Option<DailyAuditSummary>>;
}

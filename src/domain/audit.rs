//! Daily audit summaries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Every summary starts out pending; anchoring it to an external
/// ledger would flip the status, which nothing does yet.
pub const SUMMARY_STATUS_PENDING: &str = "PENDING";

/// One Merkle root over a UTC day of activity-log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAuditSummary {
    pub summary_date: NaiveDate,
    /// Lowercase hex SHA-256 root, no prefix.
    pub merkle_root: String,
    pub entry_count: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl DailyAuditSummary {
    pub fn pending(summary_date: NaiveDate, merkle_root: String, entry_count: i64) -> Self {
        Self {
            summary_date,
            merkle_root,
            entry_count,
            status: SUMMARY_STATUS_PENDING.to_string(),
            created_at: Utc::now(),
        }
    }
}

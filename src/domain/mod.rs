//! Domain model for the escrow service
//!
//! Core types shared by the coordinator, ledger clients, sync engine,
//! and audit trail: scheme/milestone identifiers, the milestone state
//! machine, observed ledger events, and activity-log entries.

mod activity;
mod audit;
mod event;
mod milestone;
mod types;

pub use activity::{ActivityBuilder, ActivityEntry, ActivityRecord, ActivitySeverity};
pub use audit::{DailyAuditSummary, SUMMARY_STATUS_PENDING};
pub use event::{LedgerEvent, LedgerEventKind, NewLedgerEvent};
pub use milestone::{Milestone, MilestoneStatus};
pub use types::{normalize_address, SchemeId, Wei};

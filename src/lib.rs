//! Fundgate
//!
//! Milestone-gated escrow service: donors fund schemes, a fund holder
//! locks them, and payouts release per milestone once proof is approved.
//! Operations run against a remote escrow contract or a local SQLite
//! demo mirror behind the same interface, with a tamper-evident audit
//! trail over everything that happened.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (schemes, milestones, events, activity)
//! - [`ledger`] - The `LedgerClient` seam, remote chain client, demo mirror
//! - [`escrow`] - Operation coordinator (preconditions, CID masking, activity)
//! - [`sync`] - Event decoding and the scheduled sync engine
//! - [`store`] - SQLite persistence for events, cursors, activity, summaries
//! - [`audit`] - Daily Merkle commitments over the activity log
//! - [`archive`] - Object-storage archival of deposit/payout events
//! - [`crypto`] - CID masking
//! - [`activity`] - In-process activity bus and its writer task

pub mod activity;
pub mod archive;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod migrations;
pub mod runtime;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use domain::{
    ActivityBuilder, ActivityEntry, ActivitySeverity, DailyAuditSummary, LedgerEvent,
    LedgerEventKind, Milestone, MilestoneStatus, NewLedgerEvent, SchemeId, Wei,
};

pub use error::{EscrowError, Result};

pub use escrow::EscrowCoordinator;

pub use ledger::{
    DemoLedgerClient, LedgerClient, OpReceipt, OpStatus, RemoteLedgerClient, RemoteLedgerConfig,
};

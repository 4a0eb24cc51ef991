//! SQLite persistence
//!
//! Storage traits with mockable seams, plus their SQLite
//! implementations. Amounts are decimal text columns and timestamps
//! are RFC 3339 text in UTC throughout.

mod activity;
mod audit_summary;
mod cursor;
mod event_store;
mod traits;

pub use activity::SqliteActivityStore;
pub use audit_summary::SqliteSummaryStore;
pub use cursor::SqliteCursorStore;
pub use event_store::SqliteEventStore;
pub use traits::{
    ActivityQuery, ActivityStore, CursorStore, EventStore, SummaryStore, UpsertOutcome,
};

#[cfg(test)]
pub use traits::{MockActivityStore, MockCursorStore, MockEventStore, MockSummaryStore};

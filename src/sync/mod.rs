//! Ledger event ingestion
//!
//! A raw log source (the remote provider in production, scripted fakes
//! in tests), a topic-0 decoder for the thirteen escrow events, and the
//! single-flight polling engine that persists them.

mod decode;
mod engine;
mod source;

pub use decode::decode_log;
pub use engine::{
    spawn_sync_engine, EventSyncEngine, SyncCommand, SyncConfig, SyncReport,
    DEFAULT_BACKFILL_WINDOW,
};
pub use source::{LogSource, RawLog};

#[cfg(test)]
pub use source::MockLogSource;

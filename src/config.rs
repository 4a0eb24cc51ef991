//! Service configuration
//!
//! Everything is read from environment variables once at startup. The
//! remote ledger has its own optional block in
//! [`RemoteLedgerConfig`](crate::ledger::RemoteLedgerConfig); absence of
//! that block selects the demo ledger.

use std::time::Duration;

use crate::sync::{SyncConfig, DEFAULT_BACKFILL_WINDOW};

/// Secret used for CID masking when `ESCROW_CID_SECRET` is unset. Fine
/// for the demo ledger, not for anything public.
pub const DEV_CID_SECRET: &str = "fundgate-dev-cid-secret";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection URL.
    pub database_url: String,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Pause between scheduled sync runs.
    pub sync_interval: Duration,
    /// First block scanned when no cursor exists.
    pub sync_start_block: Option<u64>,
    /// Blocks scanned behind head on a cold start with no start block.
    pub backfill_window: u64,
    /// Whether deposit and payout events are archived to object storage.
    pub archive_enabled: bool,
    /// Secret the CID cipher key is derived from.
    pub cid_secret: String,
    /// Days of activity-log history kept by cleanup.
    pub activity_retention_days: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://fundgate.db?mode=rwc".to_string());

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let sync_interval = std::env::var("ESCROW_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let sync_start_block = std::env::var("ESCROW_SYNC_START_BLOCK")
            .ok()
            .and_then(|v| v.parse().ok());

        let backfill_window = std::env::var("ESCROW_BACKFILL_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BACKFILL_WINDOW);

        let archive_enabled = std::env::var("ESCROW_ARCHIVE_ENABLED")
            .ok()
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(false);

        let cid_secret =
            std::env::var("ESCROW_CID_SECRET").unwrap_or_else(|_| DEV_CID_SECRET.to_string());

        let activity_retention_days: u32 = std::env::var("ESCROW_ACTIVITY_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(365);

        Self {
            database_url,
            max_connections,
            sync_interval,
            sync_start_block,
            backfill_window,
            archive_enabled,
            cid_secret,
            activity_retention_days,
        }
    }

    /// Sync settings in the shape the engine consumes.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
            start_block: self.sync_start_block,
            backfill_window: self.backfill_window,
            ..SyncConfig::default()
        }
    }
}

//! Event synchronization engine
//!
//! Polls the escrow contract's log stream on a fixed interval and turns
//! it into durable local records. Each run resolves a block range from
//! the persisted cursor, fetches and decodes the logs, upserts them
//! under the (tx hash, event name, block number) key, archives
//! money-movement events, and only then advances the cursor. A crash
//! mid-run replays the same range; the uniqueness key makes that safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::archive::{ArchiveDocument, ObjectStore};
use crate::error::Result;
use crate::store::{CursorStore, EventStore, UpsertOutcome};

use super::decode::decode_log;
use super::source::LogSource;

/// How many blocks behind head a cold start begins when neither a
/// cursor nor a start block exists.
pub const DEFAULT_BACKFILL_WINDOW: u64 = 2000;

const ARCHIVE_BATCH_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Polling interval.
    pub interval: Duration,
    /// First block to ingest when no cursor exists yet.
    pub start_block: Option<u64>,
    /// Cold-start distance behind head when no start block is set.
    pub backfill_window: u64,
    /// Cursor row key; one row per upstream source.
    pub source_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            start_block: None,
            backfill_window: DEFAULT_BACKFILL_WINDOW,
            source_key: "escrow".to_string(),
        }
    }
}

/// Control messages for the sync loop.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run now instead of waiting for the next tick.
    ForceSync,
    Shutdown,
}

/// Counters from one completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub from_block: u64,
    pub to_block: u64,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

pub struct EventSyncEngine {
    config: SyncConfig,
    source: Arc<dyn LogSource>,
    events: Arc<dyn EventStore>,
    cursor: Arc<dyn CursorStore>,
    archive: Option<Arc<dyn ObjectStore>>,
    control_tx: mpsc::Sender<SyncCommand>,
    control_rx: mpsc::Receiver<SyncCommand>,
}

impl EventSyncEngine {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn LogSource>,
        events: Arc<dyn EventStore>,
        cursor: Arc<dyn CursorStore>,
        archive: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            config,
            source,
            events,
            cursor,
            archive,
            control_tx,
            control_rx,
        }
    }

    /// Get a sender handle for controlling the engine
    pub fn control_handle(&self) -> mpsc::Sender<SyncCommand> {
        self.control_tx.clone()
    }

    /// Run the polling loop. Ticks that land while a run is still in
    /// progress are skipped, not queued.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            source_key = %self.config.source_key,
            "Starting event sync engine"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Sync run failed");
                    }
                }
                Some(command) = self.control_rx.recv() => {
                    match command {
                        SyncCommand::ForceSync => {
                            info!("Forcing sync run");
                            if let Err(e) = self.run_once().await {
                                error!(error = %e, "Forced sync run failed");
                            }
                        }
                        SyncCommand::Shutdown => {
                            info!("Event sync engine shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One full poll: resolve the block range, fetch, decode, persist,
    /// archive, advance the cursor.
    pub async fn run_once(&self) -> Result<SyncReport> {
        let head = self.source.head_block().await?;
        let from = match self.cursor.get(&self.config.source_key).await? {
            Some(last) => last + 1,
            None => match self.config.start_block {
                Some(start) => start,
                None => head.saturating_sub(self.config.backfill_window),
            },
        };

        let mut report = SyncReport {
            from_block: from,
            to_block: head,
            ..SyncReport::default()
        };
        if from > head {
            return Ok(report);
        }

        let logs = self.source.fetch_logs(from, head).await?;
        report.fetched = logs.len();

        for log in &logs {
            let event = match decode_log(log) {
                Some(event) => event,
                None => continue,
            };
            match self.events.upsert(&event).await? {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Duplicate => report.duplicates += 1,
            }
        }

        self.archive_pending().await;

        self.cursor.set(&self.config.source_key, head).await?;
        if report.inserted > 0 || report.duplicates > 0 {
            info!(
                from_block = report.from_block,
                to_block = report.to_block,
                inserted = report.inserted,
                duplicates = report.duplicates,
                "Sync run complete"
            );
        }
        Ok(report)
    }

    /// Best-effort archival pass. Failures are logged and the event
    /// stays queued for the next run.
    async fn archive_pending(&self) {
        let archive = match &self.archive {
            Some(archive) => archive,
            None => return,
        };

        let pending = match self.events.pending_archival(ARCHIVE_BATCH_LIMIT).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to list events pending archival");
                return;
            }
        };

        for event in pending {
            let document = ArchiveDocument::from_event(&event);
            let filename = document.filename();
            let value = match serde_json::to_value(&document) {
                Ok(value) => value,
                Err(e) => {
                    warn!(event_id = event.id, error = %e, "Failed to serialize archive document");
                    continue;
                }
            };

            match archive.upload_json(&value, &filename).await {
                Ok(reference) => {
                    if let Err(e) = self.events.set_archive_ref(event.id, &reference).await {
                        warn!(event_id = event.id, error = %e, "Failed to record archive ref");
                    }
                }
                Err(e) => {
                    warn!(event_id = event.id, error = %e, "Failed to archive event");
                }
            }
        }
    }
}

/// Spawn the sync engine as a background task
pub fn spawn_sync_engine(
    config: SyncConfig,
    source: Arc<dyn LogSource>,
    events: Arc<dyn EventStore>,
    cursor: Arc<dyn CursorStore>,
    archive: Option<Arc<dyn ObjectStore>>,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<SyncCommand>) {
    let engine = EventSyncEngine::new(config, source, events, cursor, archive);
    let control_handle = engine.control_handle();
    let handle = tokio::spawn(engine.run());
    (handle, control_handle)
}

//! Nightly audit summary builder
//!
//! Once per UTC day the scheduler folds the previous day's activity
//! entries into a Merkle root and records it as a `DailyAuditSummary`.
//! Verification recomputes the root from the live table; any edit to a
//! committed entry shows up as a mismatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use super::merkle::{inclusion_proof, leaf_hash, merkle_root, InclusionProof};
use crate::domain::DailyAuditSummary;
use crate::error::{EscrowError, Result};
use crate::store::{ActivityStore, SummaryStore};

/// Builds and verifies daily audit summaries.
pub struct AuditTrailBuilder {
    activity: Arc<dyn ActivityStore>,
    summaries: Arc<dyn SummaryStore>,
}

/// Outcome of re-deriving a day's root from the live activity table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditVerification {
    pub day: NaiveDate,
    pub recorded_root: String,
    pub recomputed_root: String,
    pub recorded_entries: i64,
    pub live_entries: i64,
    pub matches: bool,
}

impl AuditTrailBuilder {
    pub fn new(activity: Arc<dyn ActivityStore>, summaries: Arc<dyn SummaryStore>) -> Self {
        Self {
            activity,
            summaries,
        }
    }

    /// Commit one UTC day of activity to a summary row. A day with no
    /// entries produces no row at all.
    #[instrument(skip(self))]
    pub async fn build_for_date(&self, day: NaiveDate) -> Result<Option<DailyAuditSummary>> {
        let entries = self.activity.for_day(day).await?;
        let leaves: Vec<String> = entries.iter().map(leaf_hash).collect();
        let root = match merkle_root(&leaves) {
            Some(root) => root,
            None => {
                info!(day = %day, "No activity entries, skipping audit summary");
                return Ok(None);
            }
        };

        let summary = DailyAuditSummary::pending(day, root, entries.len() as i64);
        self.summaries.put(&summary).await?;
        info!(
            day = %day,
            entries = summary.entry_count,
            root = %summary.merkle_root,
            "Committed daily audit summary"
        );
        Ok(Some(summary))
    }

    /// Recompute a recorded day's root from the live activity table.
    pub async fn verify_day(&self, day: NaiveDate) -> Result<AuditVerification> {
        let summary = self
            .summaries
            .get(day)
            .await?
            .ok_or(EscrowError::SummaryNotFound(day))?;

        let entries = self.activity.for_day(day).await?;
        let leaves: Vec<String> = entries.iter().map(leaf_hash).collect();
        let recomputed = merkle_root(&leaves).unwrap_or_default();

        let matches =
            recomputed == summary.merkle_root && entries.len() as i64 == summary.entry_count;
        Ok(AuditVerification {
            day,
            recorded_root: summary.merkle_root,
            recomputed_root: recomputed,
            recorded_entries: summary.entry_count,
            live_entries: entries.len() as i64,
            matches,
        })
    }

    /// Sibling path for one entry within its day's tree. `None` when the
    /// entry is not part of that day.
    pub async fn proof_for_entry(
        &self,
        day: NaiveDate,
        entry_id: i64,
    ) -> Result<Option<InclusionProof>> {
        let entries = self.activity.for_day(day).await?;
        let index = match entries.iter().position(|e| e.id == entry_id) {
            Some(index) => index,
            None => return Ok(None),
        };
        let leaves: Vec<String> = entries.iter().map(leaf_hash).collect();
        Ok(inclusion_proof(&leaves, index))
    }

    /// Delete activity entries older than the retention window. Days
    /// pruned away can no longer be re-verified against their summary.
    pub async fn prune_activity(&self, older_than_days: u32) -> Result<u64> {
        self.activity.cleanup(older_than_days).await
    }
}

/// Control messages for the audit scheduler
#[derive(Debug)]
pub enum AuditCommand {
    /// Build the previous UTC day's summary immediately
    ForceBuild,
    /// Stop the scheduler loop
    Shutdown,
}

/// Runs the builder shortly after each UTC midnight.
pub struct AuditScheduler {
    builder: AuditTrailBuilder,
    retention_days: Option<u32>,
    control_tx: mpsc::Sender<AuditCommand>,
    control_rx: mpsc::Receiver<AuditCommand>,
}

impl AuditScheduler {
    pub fn new(builder: AuditTrailBuilder, retention_days: Option<u32>) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            builder,
            retention_days,
            control_tx,
            control_rx,
        }
    }

    /// Get a handle for sending control messages to this scheduler
    pub fn control_handle(&self) -> mpsc::Sender<AuditCommand> {
        self.control_tx.clone()
    }

    pub async fn run(mut self) {
        info!("Starting audit trail scheduler");
        loop {
            let wait = until_next_midnight(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.nightly().await;
                }
                Some(command) = self.control_rx.recv() => {
                    match command {
                        AuditCommand::ForceBuild => {
                            info!("Forcing audit summary build");
                            self.build_previous_day().await;
                        }
                        AuditCommand::Shutdown => {
                            info!("Audit scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn nightly(&self) {
        self.build_previous_day().await;
        if let Some(days) = self.retention_days {
            match self.builder.prune_activity(days).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Pruned expired activity entries"),
                Err(e) => error!(error = %e, "Activity pruning failed"),
            }
        }
    }

    async fn build_previous_day(&self) {
        let day = match Utc::now().date_naive().pred_opt() {
            Some(day) => day,
            None => return,
        };
        if let Err(e) = self.builder.build_for_date(day).await {
            error!(day = %day, error = %e, "Audit summary build failed");
        }
    }
}

/// Spawn the audit scheduler as a background task.
pub fn spawn_audit_scheduler(
    builder: AuditTrailBuilder,
    retention_days: Option<u32>,
) -> (JoinHandle<()>, mpsc::Sender<AuditCommand>) {
    let scheduler = AuditScheduler::new(builder, retention_days);
    let control = scheduler.control_handle();
    let handle = tokio::spawn(scheduler.run());
    (handle, control)
}

fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next_day = match now.date_naive().succ_opt() {
        Some(day) => day,
        None => return Duration::from_secs(60 * 60 * 24),
    };
    let next = next_day.and_time(NaiveTime::MIN);
    (next - now.naive_utc())
        .to_std()
        .unwrap_or(Duration::from_secs(1))
}

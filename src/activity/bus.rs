//! In-process activity bus

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::domain::ActivityEntry;
use crate::store::ActivityStore;

/// Cloneable publishing handle. Publishing never blocks and never
/// surfaces an error to the caller; a failed write is logged and the
/// operation that produced it carries on.
#[derive(Clone)]
pub struct ActivityBus {
    tx: mpsc::UnboundedSender<ActivityEntry>,
}

impl ActivityBus {
    /// Create a bus plus the receiving end for its writer task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ActivityEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, entry: ActivityEntry) {
        if self.tx.send(entry).is_err() {
            warn!("Activity writer is gone, dropping entry");
        }
    }
}

/// Drains the bus into storage until every sender is dropped.
pub fn spawn_activity_writer(
    store: Arc<dyn ActivityStore>,
    mut rx: mpsc::UnboundedReceiver<ActivityEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = store.append(&entry).await {
                error!("Failed to persist activity entry {}: {}", entry.action, e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActivityBuilder;
    use crate::store::{ActivityQuery, SqliteActivityStore};
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn published_entries_reach_storage() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::migrations::run_sqlite(&pool).await.unwrap();
        let store = Arc::new(SqliteActivityStore::new(pool));

        let (bus, rx) = ActivityBus::channel();
        let writer = spawn_activity_writer(store.clone(), rx);

        bus.publish(ActivityBuilder::new("funds_deposited", "donor-1").build());
        bus.publish(ActivityBuilder::new("scheme_locked", "holder-1").build());
        drop(bus);
        writer.await.unwrap();

        let rows = store.query(&ActivityQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn publish_after_writer_shutdown_is_quietly_dropped() {
        let (bus, rx) = ActivityBus::channel();
        drop(rx);
        bus.publish(ActivityBuilder::new("funds_deposited", "donor-1").build());
    }
}

//! Service bootstrap
//!
//! The daemon keeps the local mirror fresh: it runs the event sync
//! engine against a configured remote ledger, persists activity
//! entries, and commits the nightly audit summary. Escrow writes go
//! through [`EscrowCoordinator`](crate::escrow::EscrowCoordinator),
//! which embedding code constructs from the same building blocks.

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::activity::{spawn_activity_writer, ActivityBus};
use crate::archive::{InMemoryObjectStore, ObjectStore};
use crate::audit::{spawn_audit_scheduler, AuditCommand, AuditTrailBuilder};
use crate::config::{AppConfig, DEV_CID_SECRET};
use crate::domain::ActivityBuilder;
use crate::ledger::{RemoteLedgerClient, RemoteLedgerConfig};
use crate::store::{SqliteActivityStore, SqliteCursorStore, SqliteEventStore, SqliteSummaryStore};
use crate::sync::{spawn_sync_engine, LogSource, SyncCommand};

/// Start the background service and run until interrupted.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting fundgate v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    info!("Configuration loaded");
    info!("  Database: {}", config.database_url);
    info!("  Sync interval: {:?}", config.sync_interval);
    info!(
        "  Archival: {}",
        if config.archive_enabled { "on" } else { "off" }
    );
    if config.cid_secret == DEV_CID_SECRET {
        warn!("ESCROW_CID_SECRET is unset; CID masking uses the development secret");
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to SQLite");

    let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
        .ok()
        .map(|v| {
            !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off"
            )
        })
        .unwrap_or(true);
    if migrate_on_startup {
        crate::migrations::run_sqlite(&pool).await?;
        info!("Database migrations applied");
    } else {
        info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
    }

    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    let cursor = Arc::new(SqliteCursorStore::new(pool.clone()));
    let activity_store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));

    let (bus, activity_rx) = ActivityBus::channel();
    let writer = spawn_activity_writer(activity_store.clone(), activity_rx);

    let archive: Option<Arc<dyn ObjectStore>> = if config.archive_enabled {
        info!("Event archival enabled (in-memory object store)");
        Some(Arc::new(InMemoryObjectStore::new()))
    } else {
        None
    };

    // The sync engine only runs against a remote chain; the demo ledger
    // records its events inline as operations execute.
    let sync_worker = match RemoteLedgerConfig::from_env() {
        Some(remote_config) => {
            info!("Remote ledger configured:");
            info!("  RPC URL: {}", remote_config.rpc_url);
            info!("  Contract: {}", remote_config.contract_address);
            info!("  Chain ID: {}", remote_config.chain_id);
            let source: Arc<dyn LogSource> = Arc::new(RemoteLedgerClient::new(remote_config));
            Some(spawn_sync_engine(
                config.sync_config(),
                source,
                events.clone(),
                cursor.clone(),
                archive,
            ))
        }
        None => {
            info!(
                "Remote ledger not configured (set ESCROW_RPC_URL, ESCROW_CONTRACT_ADDRESS to enable); demo ledger mode"
            );
            None
        }
    };

    let audit_builder = AuditTrailBuilder::new(activity_store, summaries);
    let (audit_handle, audit_control) =
        spawn_audit_scheduler(audit_builder, Some(config.activity_retention_days));

    bus.publish(ActivityBuilder::new("service_started", "system").build());

    info!("fundgate is running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    bus.publish(ActivityBuilder::new("service_stopping", "system").build());

    if let Some((sync_handle, sync_control)) = sync_worker {
        let _ = sync_control.send(SyncCommand::Shutdown).await;
        sync_handle.await?;
    }
    let _ = audit_control.send(AuditCommand::Shutdown).await;
    audit_handle.await?;

    drop(bus);
    writer.await?;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

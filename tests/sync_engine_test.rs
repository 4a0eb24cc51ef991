//! Sync engine against real SQLite stores
//!
//! Scripted log sources feed encoded contract events through the
//! decode/upsert/archive path; assertions go to the actual tables.

mod common;

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;

use common::*;
use fundgate::archive::InMemoryObjectStore;
use fundgate::ledger::IMilestoneEscrow;
use fundgate::store::{
    CursorStore, EventStore, SqliteCursorStore, SqliteEventStore, UpsertOutcome,
};
use fundgate::sync::{EventSyncEngine, RawLog, SyncConfig};
use fundgate::{LedgerEventKind, Wei};

const TX_A: &str = "0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a";
const TX_B: &str = "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b";
const TX_C: &str = "0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c";

fn deposit_log(block: u64) -> RawLog {
    let ev = IMilestoneEscrow::FundsDeposited {
        schemeId: U256::from(42u64),
        donor: Address::repeat_byte(0xaa),
        amount: U256::from(100u64),
    };
    raw_log(ev.encode_log_data(), TX_A, block)
}

fn release_log(block: u64) -> RawLog {
    let ev = IMilestoneEscrow::PaymentReleased {
        schemeId: U256::from(42u64),
        milestoneId: U256::from(1u64),
        vendor: Address::repeat_byte(0xbb),
        amount: U256::from(40u64),
    };
    raw_log(ev.encode_log_data(), TX_B, block)
}

fn approval_log(block: u64) -> RawLog {
    let ev = IMilestoneEscrow::MilestoneApproved {
        schemeId: U256::from(42u64),
        milestoneId: U256::from(1u64),
        approver: Address::repeat_byte(0xcc),
    };
    raw_log(ev.encode_log_data(), TX_C, block)
}

fn engine_config(source_key: &str, start_block: u64) -> SyncConfig {
    SyncConfig {
        start_block: Some(start_block),
        source_key: source_key.to_string(),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn replayed_windows_store_each_event_once() {
    let pool = memory_pool().await;
    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    let cursor = Arc::new(SqliteCursorStore::new(pool.clone()));

    let logs = vec![deposit_log(100), release_log(101)];

    let first = EventSyncEngine::new(
        engine_config("first", 100),
        Arc::new(ScriptedLogSource::new(105, logs.clone())),
        events.clone(),
        cursor.clone(),
        None,
    );
    let report = first.run_once().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(cursor.get("first").await.unwrap(), Some(105));

    // A second pass over the same window only sees duplicates.
    let second = EventSyncEngine::new(
        engine_config("second", 100),
        Arc::new(ScriptedLogSource::new(105, logs)),
        events.clone(),
        cursor.clone(),
        None,
    );
    let report = second.run_once().await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 2);

    let stored = events.recent(10).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn unknown_topics_are_skipped() {
    let pool = memory_pool().await;
    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    let cursor = Arc::new(SqliteCursorStore::new(pool.clone()));

    let alien = RawLog {
        topics: vec![B256::repeat_byte(0x99)],
        data: vec![],
        tx_hash: TX_C.to_string(),
        block_number: 102,
    };
    let engine = EventSyncEngine::new(
        engine_config("escrow", 100),
        Arc::new(ScriptedLogSource::new(110, vec![deposit_log(100), alien])),
        events.clone(),
        cursor.clone(),
        None,
    );

    let report = engine.run_once().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(cursor.get("escrow").await.unwrap(), Some(110));

    let stored = events.recent(10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, LedgerEventKind::FundsDeposited);
    assert_eq!(stored[0].amount_wei, Some(Wei::new(100)));
}

#[tokio::test]
async fn fetch_failure_leaves_the_cursor_alone() {
    let pool = memory_pool().await;
    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    let cursor = Arc::new(SqliteCursorStore::new(pool.clone()));
    cursor.set("escrow", 200).await.unwrap();

    let engine = EventSyncEngine::new(
        engine_config("escrow", 100),
        Arc::new(FailingLogSource { head: 300 }),
        events,
        cursor.clone(),
        None,
    );

    let err = engine.run_once().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(cursor.get("escrow").await.unwrap(), Some(200));
}

#[tokio::test]
async fn money_events_are_archived_and_referenced() {
    let pool = memory_pool().await;
    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    let cursor = Arc::new(SqliteCursorStore::new(pool.clone()));
    let archive = Arc::new(InMemoryObjectStore::new());

    let engine = EventSyncEngine::new(
        engine_config("escrow", 100),
        Arc::new(ScriptedLogSource::new(
            110,
            vec![deposit_log(100), release_log(101), approval_log(102)],
        )),
        events.clone(),
        cursor,
        Some(archive.clone()),
    );
    engine.run_once().await.unwrap();

    assert_eq!(archive.len(), 2);

    let stored = events.recent(10).await.unwrap();
    for event in &stored {
        match event.kind {
            LedgerEventKind::FundsDeposited | LedgerEventKind::PaymentReleased => {
                let archive_ref = event.archive_ref.as_deref().unwrap();
                assert!(archive_ref.starts_with("mem://events/"));
                assert!(archive_ref.ends_with(".json"));
            }
            _ => assert!(event.archive_ref.is_none()),
        }
    }

    // Nothing left to archive, and already-archived rows stay put.
    assert!(events.pending_archival(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn decoded_quotation_cid_lands_in_the_reference_column() {
    let pool = memory_pool().await;
    let events = Arc::new(SqliteEventStore::new(pool.clone()));

    let ev = IMilestoneEscrow::QuotationStored {
        schemeId: U256::from(42u64),
        milestoneId: U256::from(1u64),
        quotationCid: "cid1:masked-quotation".to_string(),
    };
    let log = raw_log(ev.encode_log_data(), TX_A, 100);
    let decoded = fundgate::sync::decode_log(&log).unwrap();
    assert_eq!(events.upsert(&decoded).await.unwrap(), UpsertOutcome::Inserted);

    let stored = events.recent(10).await.unwrap();
    assert_eq!(stored[0].kind, LedgerEventKind::QuotationStored);
    assert_eq!(
        stored[0].archive_ref.as_deref(),
        Some("cid1:masked-quotation")
    );
}

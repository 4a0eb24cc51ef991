//! Audit trail over the live activity path
//!
//! Entries travel bus -> writer -> SQLite exactly as in production,
//! then the nightly builder commits them and verification re-derives
//! the root from the table.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use common::*;
use fundgate::activity::{spawn_activity_writer, ActivityBus};
use fundgate::audit::{leaf_hash, merkle_root, AuditTrailBuilder};
use fundgate::domain::{ActivityBuilder, ActivityEntry, SUMMARY_STATUS_PENDING};
use fundgate::store::{
    ActivityQuery, ActivityStore, SqliteActivityStore, SqliteSummaryStore, SummaryStore,
};
use fundgate::EscrowError;

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn entry_at(action: &str, actor: &str, at: &str) -> ActivityEntry {
    let mut entry = ActivityBuilder::new(action, actor).build();
    entry.created_at = DateTime::parse_from_rfc3339(at)
        .unwrap()
        .with_timezone(&Utc);
    entry
}

#[tokio::test]
async fn bus_entries_fold_into_a_deterministic_root() {
    let pool = memory_pool().await;
    let store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));

    let (bus, rx) = ActivityBus::channel();
    let writer = spawn_activity_writer(store.clone(), rx);
    bus.publish(ActivityBuilder::new("scheme_created", HOLDER).build());
    bus.publish(ActivityBuilder::new("funds_deposited", DONOR).build());
    bus.publish(ActivityBuilder::new("payment_released", HOLDER).build());
    drop(bus);
    writer.await.unwrap();

    let today = Utc::now().date_naive();
    let builder = AuditTrailBuilder::new(store.clone(), summaries.clone());
    let summary = builder.build_for_date(today).await.unwrap().unwrap();
    assert_eq!(summary.entry_count, 3);
    assert_eq!(summary.status, SUMMARY_STATUS_PENDING);

    let entries = store.for_day(today).await.unwrap();
    let leaves: Vec<String> = entries.iter().map(leaf_hash).collect();
    assert_eq!(merkle_root(&leaves), Some(summary.merkle_root.clone()));

    let rebuilt = builder.build_for_date(today).await.unwrap().unwrap();
    assert_eq!(rebuilt.merkle_root, summary.merkle_root);

    let recorded = summaries.get(today).await.unwrap().unwrap();
    assert_eq!(recorded.merkle_root, summary.merkle_root);
}

#[tokio::test]
async fn edits_after_commit_fail_verification() {
    let pool = memory_pool().await;
    let store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));
    let builder = AuditTrailBuilder::new(store.clone(), summaries);

    for (action, actor, at) in [
        ("funds_deposited", DONOR, "2026-02-10T08:00:00Z"),
        ("milestone_approved", "approver-1", "2026-02-10T12:00:00Z"),
        ("payment_released", HOLDER, "2026-02-10T12:05:00Z"),
    ] {
        store.append(&entry_at(action, actor, at)).await.unwrap();
    }
    builder.build_for_date(day("2026-02-10")).await.unwrap();

    let clean = builder.verify_day(day("2026-02-10")).await.unwrap();
    assert!(clean.matches);

    sqlx::query("UPDATE activity_log SET action = 'scheme_locked' WHERE action = 'funds_deposited'")
        .execute(&pool)
        .await
        .unwrap();

    let tampered = builder.verify_day(day("2026-02-10")).await.unwrap();
    assert!(!tampered.matches);
    assert_ne!(tampered.recorded_root, tampered.recomputed_root);
}

#[tokio::test]
async fn inclusion_proofs_verify_each_committed_entry() {
    let pool = memory_pool().await;
    let store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));
    let builder = AuditTrailBuilder::new(store.clone(), summaries);

    for i in 0..5 {
        let at = format!("2026-02-10T0{i}:00:00Z");
        store
            .append(&entry_at("funds_deposited", &format!("donor-{i}"), &at))
            .await
            .unwrap();
    }
    let summary = builder
        .build_for_date(day("2026-02-10"))
        .await
        .unwrap()
        .unwrap();

    let entries = store.for_day(day("2026-02-10")).await.unwrap();
    for entry in &entries {
        let proof = builder
            .proof_for_entry(day("2026-02-10"), entry.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(proof.leaf, leaf_hash(entry));
        assert!(proof.verify(&summary.merkle_root));
    }

    // A proof only speaks for its own leaf.
    let mut forged = builder
        .proof_for_entry(day("2026-02-10"), entries[0].id)
        .await
        .unwrap()
        .unwrap();
    forged.leaf = leaf_hash(&entries[1]);
    assert!(!forged.verify(&summary.merkle_root));

    let unknown = builder
        .proof_for_entry(day("2026-02-10"), 9_999)
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn quiet_days_produce_no_summary() {
    let pool = memory_pool().await;
    let store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));
    let builder = AuditTrailBuilder::new(store, summaries);

    let built = builder.build_for_date(day("2026-02-10")).await.unwrap();
    assert!(built.is_none());

    let err = builder.verify_day(day("2026-02-10")).await.unwrap_err();
    assert!(matches!(err, EscrowError::SummaryNotFound(_)));
}

#[tokio::test]
async fn pruning_drops_only_expired_entries() {
    let pool = memory_pool().await;
    let store = Arc::new(SqliteActivityStore::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryStore::new(pool.clone()));
    let builder = AuditTrailBuilder::new(store.clone(), summaries);

    let mut stale = ActivityBuilder::new("funds_deposited", DONOR).build();
    stale.created_at = Utc::now() - Duration::days(40);
    store.append(&stale).await.unwrap();
    store
        .append(&ActivityBuilder::new("payment_released", HOLDER).build())
        .await
        .unwrap();

    assert_eq!(builder.prune_activity(30).await.unwrap(), 1);

    let left = store.query(&ActivityQuery::default()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].action, "payment_released");
}

//! Demo ledger backed by sqlite
//!
//! Stands in for the escrow contract when no remote ledger is configured.
//! The contract's balances (contract total, per-scheme, per-donor) live in
//! `demo_*` tables, milestone rows carry the same state machine the
//! contract enforces, and money-movement operations append synthetic
//! ledger events so the event feed shows demo activity exactly like
//! chain activity.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, Sqlite, Transaction};
use uuid::Uuid;

use crate::domain::{LedgerEventKind, Milestone, MilestoneStatus, NewLedgerEvent, Wei};
use crate::error::{EscrowError, Result};

use super::{LedgerClient, SchemeCreation, TxReceipt};

/// Block number attached to synthetic demo events.
const DEMO_BLOCK: u64 = 0;

/// Sqlite-backed stand-in for the escrow contract.
pub struct DemoLedgerClient {
    pool: SqlitePool,
}

impl DemoLedgerClient {
    /// Create a demo ledger over an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a demo ledger at the given database path.
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Ok(Self { pool })
    }

    /// `None` when the scheme is unknown, otherwise its lock flag.
    async fn scheme_locked(tx: &mut Transaction<'_, Sqlite>, scheme: u128) -> Result<Option<bool>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT locked FROM demo_scheme WHERE scheme_ledger_id = ?")
                .bind(scheme.to_string())
                .fetch_optional(&mut **tx)
                .await?;
        Ok(row.map(|r| r.0 != 0))
    }

    async fn contract_balance_tx(tx: &mut Transaction<'_, Sqlite>) -> Result<Wei> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT balance_wei FROM demo_contract_balance WHERE id = 1")
                .fetch_optional(&mut **tx)
                .await?;
        match row {
            Some((text,)) => Wei::from_text(&text),
            None => Ok(Wei::new(0)),
        }
    }

    async fn scheme_balance_tx(tx: &mut Transaction<'_, Sqlite>, scheme: u128) -> Result<Wei> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT balance_wei FROM demo_scheme_balance WHERE scheme_ledger_id = ?")
                .bind(scheme.to_string())
                .fetch_optional(&mut **tx)
                .await?;
        match row {
            Some((text,)) => Wei::from_text(&text),
            None => Ok(Wei::new(0)),
        }
    }

    async fn donor_contribution_tx(
        tx: &mut Transaction<'_, Sqlite>,
        scheme: u128,
        donor: &str,
    ) -> Result<Wei> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT amount_wei FROM demo_donor_contribution \
             WHERE scheme_ledger_id = ? AND donor = ?",
        )
        .bind(scheme.to_string())
        .bind(donor)
        .fetch_optional(&mut **tx)
        .await?;
        match row {
            Some((text,)) => Wei::from_text(&text),
            None => Ok(Wei::new(0)),
        }
    }

    async fn put_contract_balance(tx: &mut Transaction<'_, Sqlite>, balance: Wei) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO demo_contract_balance (id, balance_wei, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET balance_wei = ?, updated_at = ?
            "#,
        )
        .bind(balance.to_string())
        .bind(&now)
        .bind(balance.to_string())
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn put_scheme_balance(
        tx: &mut Transaction<'_, Sqlite>,
        scheme: u128,
        balance: Wei,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO demo_scheme_balance (scheme_ledger_id, balance_wei, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(scheme_ledger_id) DO UPDATE SET balance_wei = ?, updated_at = ?
            "#,
        )
        .bind(scheme.to_string())
        .bind(balance.to_string())
        .bind(&now)
        .bind(balance.to_string())
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn put_donor_contribution(
        tx: &mut Transaction<'_, Sqlite>,
        scheme: u128,
        donor: &str,
        amount: Wei,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO demo_donor_contribution (scheme_ledger_id, donor, amount_wei, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(scheme_ledger_id, donor) DO UPDATE SET amount_wei = ?, updated_at = ?
            "#,
        )
        .bind(scheme.to_string())
        .bind(donor)
        .bind(amount.to_string())
        .bind(&now)
        .bind(amount.to_string())
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn milestone_tx(
        tx: &mut Transaction<'_, Sqlite>,
        scheme: u128,
        seq: u64,
    ) -> Result<Option<DemoMilestoneRow>> {
        let row = sqlx::query_as::<_, DemoMilestoneRow>(
            r#"
            SELECT amount_wei, vendor, quotation_cid, proof_cid, status
            FROM demo_milestone
            WHERE scheme_ledger_id = ? AND seq = ?
            "#,
        )
        .bind(scheme.to_string())
        .bind(seq as i64)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Validate and apply one status transition inside a single
    /// transaction, optionally setting an attribute column with it.
    async fn transition(
        &self,
        scheme: u128,
        seq: u64,
        to: MilestoneStatus,
        attr: Option<(&'static str, &str)>,
    ) -> Result<TxReceipt> {
        let mut tx = self.pool.begin().await?;

        let row = Self::milestone_tx(&mut tx, scheme, seq).await?.ok_or(
            EscrowError::MilestoneNotFound {
                scheme: scheme.to_string(),
                milestone: seq,
            },
        )?;
        let from = parse_status(&row.status)?;
        if !from.can_transition_to(to) {
            return Err(EscrowError::InvalidTransition {
                scheme: scheme.to_string(),
                milestone: seq,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let sql = match attr {
            Some((column, _)) => format!(
                "UPDATE demo_milestone SET status = ?, {} = ?, updated_at = ? \
                 WHERE scheme_ledger_id = ? AND seq = ?",
                column
            ),
            None => "UPDATE demo_milestone SET status = ?, updated_at = ? \
                     WHERE scheme_ledger_id = ? AND seq = ?"
                .to_string(),
        };
        let mut query = sqlx::query(&sql).bind(to.as_str());
        if let Some((_, value)) = attr {
            query = query.bind(value);
        }
        query
            .bind(&now)
            .bind(scheme.to_string())
            .bind(seq as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(TxReceipt::new(synthetic_tx_hash(), None))
    }

    /// Move `amount` out of the scheme and the contract total, flip the
    /// milestone to `to`, and append the given event, all in one
    /// transaction. Shared by release and refund.
    async fn pay_out(
        &self,
        mut tx: Transaction<'_, Sqlite>,
        scheme: u128,
        seq: u64,
        amount: Wei,
        to: MilestoneStatus,
    ) -> Result<()> {
        let scheme_before = Self::scheme_balance_tx(&mut tx, scheme).await?;
        let scheme_after = scheme_before.checked_sub(amount).ok_or_else(|| {
            EscrowError::LedgerRejected(format!(
                "insufficient scheme balance: {} < {}",
                scheme_before, amount
            ))
        })?;
        let contract_before = Self::contract_balance_tx(&mut tx).await?;
        let contract_after = contract_before.checked_sub(amount).ok_or_else(|| {
            EscrowError::LedgerRejected(format!(
                "insufficient contract balance: {} < {}",
                contract_before, amount
            ))
        })?;

        Self::put_scheme_balance(&mut tx, scheme, scheme_after).await?;
        Self::put_contract_balance(&mut tx, contract_after).await?;

        sqlx::query(
            "UPDATE demo_milestone SET status = ?, updated_at = ? \
             WHERE scheme_ledger_id = ? AND seq = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(scheme.to_string())
        .bind(seq as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for DemoLedgerClient {
    async fn scheme_exists(&self, scheme: u128) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM demo_scheme WHERE scheme_ledger_id = ?")
                .bind(scheme.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn scheme_balance(&self, scheme: u128) -> Result<Wei> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT balance_wei FROM demo_scheme_balance WHERE scheme_ledger_id = ?")
                .bind(scheme.to_string())
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((text,)) => Wei::from_text(&text),
            None => Ok(Wei::new(0)),
        }
    }

    async fn donor_contribution(&self, scheme: u128, donor: &str) -> Result<Wei> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT amount_wei FROM demo_donor_contribution \
             WHERE scheme_ledger_id = ? AND donor = ?",
        )
        .bind(scheme.to_string())
        .bind(donor)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((text,)) => Wei::from_text(&text),
            None => Ok(Wei::new(0)),
        }
    }

    async fn milestone(&self, scheme: u128, seq: u64) -> Result<Option<Milestone>> {
        let row = sqlx::query_as::<_, DemoMilestoneRow>(
            r#"
            SELECT amount_wei, vendor, quotation_cid, proof_cid, status
            FROM demo_milestone
            WHERE scheme_ledger_id = ? AND seq = ?
            "#,
        )
        .bind(scheme.to_string())
        .bind(seq as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.into_milestone(scheme, seq)).transpose()
    }

    async fn create_scheme(&self, scheme: u128) -> Result<SchemeCreation> {
        let mut tx = self.pool.begin().await?;
        if Self::scheme_locked(&mut tx, scheme).await?.is_some() {
            return Ok(SchemeCreation::Exists);
        }
        sqlx::query("INSERT INTO demo_scheme (scheme_ledger_id, locked, created_at) VALUES (?, 0, ?)")
            .bind(scheme.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(SchemeCreation::Created(TxReceipt::new(
            synthetic_tx_hash(),
            None,
        )))
    }

    async fn lock_scheme(&self, scheme: u128) -> Result<TxReceipt> {
        let mut tx = self.pool.begin().await?;
        match Self::scheme_locked(&mut tx, scheme).await? {
            None => return Err(EscrowError::SchemeNotFound(scheme.to_string())),
            Some(true) => {
                return Err(EscrowError::LedgerRejected(format!(
                    "scheme {} is already locked",
                    scheme
                )))
            }
            Some(false) => {}
        }
        sqlx::query("UPDATE demo_scheme SET locked = 1 WHERE scheme_ledger_id = ?")
            .bind(scheme.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(TxReceipt::new(synthetic_tx_hash(), None))
    }

    async fn record_deposit(&self, scheme: u128, donor: &str, amount: Wei) -> Result<TxReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        match Self::scheme_locked(&mut tx, scheme).await? {
            None => return Err(EscrowError::SchemeNotFound(scheme.to_string())),
            Some(true) => {
                return Err(EscrowError::LedgerRejected(format!(
                    "scheme {} is locked, deposits are closed",
                    scheme
                )))
            }
            Some(false) => {}
        }

        let contract = Self::contract_balance_tx(&mut tx)
            .await?
            .checked_add(amount)
            .ok_or_else(|| EscrowError::LedgerRejected("contract balance overflow".to_string()))?;
        let scheme_total = Self::scheme_balance_tx(&mut tx, scheme)
            .await?
            .checked_add(amount)
            .ok_or_else(|| EscrowError::LedgerRejected("scheme balance overflow".to_string()))?;
        let donor_total = Self::donor_contribution_tx(&mut tx, scheme, donor)
            .await?
            .checked_add(amount)
            .ok_or_else(|| {
                EscrowError::LedgerRejected("donor contribution overflow".to_string())
            })?;

        Self::put_contract_balance(&mut tx, contract).await?;
        Self::put_scheme_balance(&mut tx, scheme, scheme_total).await?;
        Self::put_donor_contribution(&mut tx, scheme, donor, donor_total).await?;

        let tx_hash = synthetic_tx_hash();
        let event = NewLedgerEvent::new(
            LedgerEventKind::FundsDeposited,
            tx_hash.clone(),
            DEMO_BLOCK,
            scheme.to_string(),
        )
        .actor(donor)
        .amount(amount);
        append_event(&mut tx, &event).await?;

        tx.commit().await?;
        Ok(TxReceipt::new(tx_hash, None))
    }

    async fn create_milestone(&self, scheme: u128, seq: u64, amount: Wei) -> Result<TxReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "milestone amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        if Self::scheme_locked(&mut tx, scheme).await?.is_none() {
            return Err(EscrowError::SchemeNotFound(scheme.to_string()));
        }
        if Self::milestone_tx(&mut tx, scheme, seq).await?.is_some() {
            return Err(EscrowError::LedgerRejected(format!(
                "milestone {}/{} already exists",
                scheme, seq
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO demo_milestone (scheme_ledger_id, seq, amount_wei, status, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(scheme.to_string())
        .bind(seq as i64)
        .bind(amount.to_string())
        .bind(MilestoneStatus::Created.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(TxReceipt::new(synthetic_tx_hash(), None))
    }

    async fn set_vendor(&self, scheme: u128, seq: u64, vendor: &str) -> Result<TxReceipt> {
        self.transition(
            scheme,
            seq,
            MilestoneStatus::VendorAssigned,
            Some(("vendor", vendor)),
        )
        .await
    }

    async fn store_quotation(
        &self,
        scheme: u128,
        seq: u64,
        quotation_ref: &str,
    ) -> Result<TxReceipt> {
        self.transition(
            scheme,
            seq,
            MilestoneStatus::QuotationStored,
            Some(("quotation_cid", quotation_ref)),
        )
        .await
    }

    async fn submit_proof(&self, scheme: u128, seq: u64, proof_ref: &str) -> Result<TxReceipt> {
        self.transition(
            scheme,
            seq,
            MilestoneStatus::ProofSubmitted,
            Some(("proof_cid", proof_ref)),
        )
        .await
    }

    async fn approve_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt> {
        self.transition(scheme, seq, MilestoneStatus::Approved, None)
            .await
    }

    async fn reject_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt> {
        self.transition(scheme, seq, MilestoneStatus::Rejected, None)
            .await
    }

    async fn release_payment(&self, scheme: u128, seq: u64, invoice: &str) -> Result<TxReceipt> {
        let mut tx = self.pool.begin().await?;

        let row = Self::milestone_tx(&mut tx, scheme, seq).await?.ok_or(
            EscrowError::MilestoneNotFound {
                scheme: scheme.to_string(),
                milestone: seq,
            },
        )?;
        let amount = Wei::from_text(&row.amount_wei)?;

        // The event's uniqueness key is the payout idempotency gate, so
        // the insert runs before the state check: a replayed invoice
        // surfaces as a conflict even though the row is already released.
        let tx_hash = release_tx_hash(invoice);
        let mut event = NewLedgerEvent::new(
            LedgerEventKind::PaymentReleased,
            tx_hash.clone(),
            DEMO_BLOCK,
            scheme.to_string(),
        )
        .milestone_seq(seq)
        .amount(amount);
        if let Some(vendor) = row.vendor.as_deref() {
            event = event.beneficiary(vendor);
        }
        if let Err(e) = append_event(&mut tx, &event).await {
            return Err(match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    EscrowError::ReleaseConflict {
                        invoice: invoice.to_string(),
                    }
                }
                other => other.into(),
            });
        }

        let from = parse_status(&row.status)?;
        if !from.can_transition_to(MilestoneStatus::Released) {
            return Err(EscrowError::InvalidTransition {
                scheme: scheme.to_string(),
                milestone: seq,
                from: from.to_string(),
                to: MilestoneStatus::Released.to_string(),
            });
        }

        self.pay_out(tx, scheme, seq, amount, MilestoneStatus::Released)
            .await?;
        Ok(TxReceipt::new(tx_hash, None))
    }

    async fn refund(&self, scheme: u128, seq: u64, to: &str) -> Result<TxReceipt> {
        let mut tx = self.pool.begin().await?;

        let row = Self::milestone_tx(&mut tx, scheme, seq).await?.ok_or(
            EscrowError::MilestoneNotFound {
                scheme: scheme.to_string(),
                milestone: seq,
            },
        )?;
        let from = parse_status(&row.status)?;
        if !from.can_transition_to(MilestoneStatus::Refunded) {
            return Err(EscrowError::InvalidTransition {
                scheme: scheme.to_string(),
                milestone: seq,
                from: from.to_string(),
                to: MilestoneStatus::Refunded.to_string(),
            });
        }
        let amount = Wei::from_text(&row.amount_wei)?;

        let tx_hash = synthetic_tx_hash();
        let event = NewLedgerEvent::new(
            LedgerEventKind::RefundIssued,
            tx_hash.clone(),
            DEMO_BLOCK,
            scheme.to_string(),
        )
        .milestone_seq(seq)
        .beneficiary(to)
        .amount(amount);
        append_event(&mut tx, &event).await?;

        self.pay_out(tx, scheme, seq, amount, MilestoneStatus::Refunded)
            .await?;
        Ok(TxReceipt::new(tx_hash, None))
    }
}

/// 64-hex synthetic transaction hash for demo writes.
fn synthetic_tx_hash() -> String {
    hex::encode(Sha256::digest(Uuid::new_v4().as_bytes()))
}

/// Deterministic hash for a release: replaying the same invoice collides
/// on the ledger_event uniqueness key.
fn release_tx_hash(invoice: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"release:");
    hasher.update(invoice.as_bytes());
    hex::encode(hasher.finalize())
}

fn parse_status(s: &str) -> Result<MilestoneStatus> {
    MilestoneStatus::parse(s)
        .ok_or_else(|| EscrowError::Internal(format!("unknown milestone status: {}", s)))
}

async fn append_event(
    tx: &mut Transaction<'_, Sqlite>,
    event: &NewLedgerEvent,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_event (
            event_name, tx_hash, block_number, scheme_ledger_id,
            milestone_seq, actor, beneficiary, amount_wei, archive_ref, observed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.kind.as_str())
    .bind(&event.tx_hash)
    .bind(event.block_number as i64)
    .bind(&event.scheme_ledger_id)
    .bind(event.milestone_seq.map(|s| s as i64))
    .bind(event.actor.as_deref())
    .bind(event.beneficiary.as_deref())
    .bind(event.amount_wei.map(|w| w.to_string()))
    .bind(event.archive_ref.as_deref())
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Raw row from demo_milestone
#[derive(Debug, FromRow)]
struct DemoMilestoneRow {
    amount_wei: String,
    vendor: Option<String>,
    quotation_cid: Option<String>,
    proof_cid: Option<String>,
    status: String,
}

impl DemoMilestoneRow {
    fn into_milestone(self, scheme: u128, seq: u64) -> Result<Milestone> {
        Ok(Milestone {
            scheme_ledger_id: scheme,
            seq,
            amount: Wei::from_text(&self.amount_wei)?,
            vendor: self.vendor,
            quotation_ref: self.quotation_cid,
            proof_ref: self.proof_cid,
            status: parse_status(&self.status)?,
        })
    }
}

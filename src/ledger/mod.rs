//! Ledger clients
//!
//! One capability interface, two implementations selected at startup:
//! `RemoteLedgerClient` signs transactions against the escrow contract,
//! `DemoLedgerClient` mirrors the same balances in sqlite when no
//! remote ledger is configured. Callers depend only on the trait.

mod demo;
mod idmap;
mod remote;

pub use demo::DemoLedgerClient;
pub use idmap::settlement_address;
pub use remote::{IMilestoneEscrow, RemoteLedgerClient, RemoteLedgerConfig};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::domain::{Milestone, Wei};
use crate::error::Result;

/// Receipt for a successful ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Lowercase hex, no 0x prefix.
    pub tx_hash: String,
    /// Absent for demo-mode writes and for receipts the node returned
    /// before inclusion.
    pub block_number: Option<u64>,
}

impl TxReceipt {
    pub fn new(tx_hash: impl Into<String>, block_number: Option<u64>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            block_number,
        }
    }
}

/// Outcome of `create_scheme`: creating an already-registered scheme is
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeCreation {
    Created(TxReceipt),
    Exists,
}

/// Status tag attached to every coordinator receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpStatus {
    Created,
    Exists,
    Deposited,
    Locked,
    MilestoneCreated,
    VendorSet,
    QuotationStored,
    ProofSubmitted,
    Approved,
    Rejected,
    Released,
    Refunded,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Created => "created",
            OpStatus::Exists => "exists",
            OpStatus::Deposited => "deposited",
            OpStatus::Locked => "locked",
            OpStatus::MilestoneCreated => "milestoneCreated",
            OpStatus::VendorSet => "vendorSet",
            OpStatus::QuotationStored => "quotationStored",
            OpStatus::ProofSubmitted => "proofSubmitted",
            OpStatus::Approved => "approved",
            OpStatus::Rejected => "rejected",
            OpStatus::Released => "released",
            OpStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a coordinator operation hands back to its caller: the status
/// tag plus the ledger receipt, when one was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpReceipt {
    pub status: OpStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl OpReceipt {
    pub fn new(status: OpStatus, receipt: TxReceipt) -> Self {
        Self {
            status,
            tx_hash: Some(receipt.tx_hash),
            block_number: receipt.block_number,
        }
    }

    /// Receipt-less outcome, the idempotent create-scheme case.
    pub fn bare(status: OpStatus) -> Self {
        Self {
            status,
            tx_hash: None,
            block_number: None,
        }
    }
}

/// Read and write surface shared by the remote contract client and the
/// demo mirror.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn scheme_exists(&self, scheme: u128) -> Result<bool>;

    async fn scheme_balance(&self, scheme: u128) -> Result<Wei>;

    async fn donor_contribution(&self, scheme: u128, donor: &str) -> Result<Wei>;

    /// `None` when the milestone was never created.
    async fn milestone(&self, scheme: u128, seq: u64) -> Result<Option<Milestone>>;

    async fn create_scheme(&self, scheme: u128) -> Result<SchemeCreation>;

    async fn lock_scheme(&self, scheme: u128) -> Result<TxReceipt>;

    async fn record_deposit(&self, scheme: u128, donor: &str, amount: Wei) -> Result<TxReceipt>;

    async fn create_milestone(&self, scheme: u128, seq: u64, amount: Wei) -> Result<TxReceipt>;

    async fn set_vendor(&self, scheme: u128, seq: u64, vendor: &str) -> Result<TxReceipt>;

    async fn store_quotation(&self, scheme: u128, seq: u64, quotation_ref: &str)
        -> Result<TxReceipt>;

    async fn submit_proof(&self, scheme: u128, seq: u64, proof_ref: &str) -> Result<TxReceipt>;

    async fn approve_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt>;

    async fn reject_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt>;

    /// `invoice` keys the payout: the demo ledger rejects a second
    /// release for the same invoice as a conflict, the contract receives
    /// its hash alongside the release.
    async fn release_payment(&self, scheme: u128, seq: u64, invoice: &str) -> Result<TxReceipt>;

    async fn refund(&self, scheme: u128, seq: u64, to: &str) -> Result<TxReceipt>;
}

//! Observed ledger events
//!
//! Each record captures one externally observed state change from the
//! escrow contract (or a synthetic demo-mode equivalent). The triple
//! (transaction hash, event name, block number) is the sole
//! deduplication key: one physical transaction may emit several named
//! events, and each is a distinct record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::Wei;

/// The thirteen event kinds the sync engine knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerEventKind {
    FundsDeposited,
    ProofSubmitted,
    MilestoneApproved,
    PaymentReleased,
    VendorSet,
    QuotationStored,
    MilestoneCreated,
    MilestoneStatusUpdated,
    MilestoneRejected,
    RefundIssued,
    FundsLocked,
    SchemeCreated,
    InvoiceHashStored,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::FundsDeposited => "FundsDeposited",
            LedgerEventKind::ProofSubmitted => "ProofSubmitted",
            LedgerEventKind::MilestoneApproved => "MilestoneApproved",
            LedgerEventKind::PaymentReleased => "PaymentReleased",
            LedgerEventKind::VendorSet => "VendorSet",
            LedgerEventKind::QuotationStored => "QuotationStored",
            LedgerEventKind::MilestoneCreated => "MilestoneCreated",
            LedgerEventKind::MilestoneStatusUpdated => "MilestoneStatusUpdated",
            LedgerEventKind::MilestoneRejected => "MilestoneRejected",
            LedgerEventKind::RefundIssued => "RefundIssued",
            LedgerEventKind::FundsLocked => "FundsLocked",
            LedgerEventKind::SchemeCreated => "SchemeCreated",
            LedgerEventKind::InvoiceHashStored => "InvoiceHashStored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FundsDeposited" => Some(LedgerEventKind::FundsDeposited),
            "ProofSubmitted" => Some(LedgerEventKind::ProofSubmitted),
            "MilestoneApproved" => Some(LedgerEventKind::MilestoneApproved),
            "PaymentReleased" => Some(LedgerEventKind::PaymentReleased),
            "VendorSet" => Some(LedgerEventKind::VendorSet),
            "QuotationStored" => Some(LedgerEventKind::QuotationStored),
            "MilestoneCreated" => Some(LedgerEventKind::MilestoneCreated),
            "MilestoneStatusUpdated" => Some(LedgerEventKind::MilestoneStatusUpdated),
            "MilestoneRejected" => Some(LedgerEventKind::MilestoneRejected),
            "RefundIssued" => Some(LedgerEventKind::RefundIssued),
            "FundsLocked" => Some(LedgerEventKind::FundsLocked),
            "SchemeCreated" => Some(LedgerEventKind::SchemeCreated),
            "InvoiceHashStored" => Some(LedgerEventKind::InvoiceHashStored),
            _ => None,
        }
    }

}

impl std::fmt::Display for LedgerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded event ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEvent {
    pub kind: LedgerEventKind,
    /// Lowercase hex, no 0x prefix.
    pub tx_hash: String,
    pub block_number: u64,
    /// Decimal text of the scheme's 128-bit ledger id.
    pub scheme_ledger_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_seq: Option<u64>,
    /// Initiating address where the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Receiving address where the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_wei: Option<Wei>,
    /// Object-storage reference, attached asynchronously.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_ref: Option<String>,
}

impl NewLedgerEvent {
    pub fn new(
        kind: LedgerEventKind,
        tx_hash: impl Into<String>,
        block_number: u64,
        scheme_ledger_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            tx_hash: tx_hash.into(),
            block_number,
            scheme_ledger_id: scheme_ledger_id.into(),
            milestone_seq: None,
            actor: None,
            beneficiary: None,
            amount_wei: None,
            archive_ref: None,
        }
    }

    pub fn milestone_seq(mut self, seq: u64) -> Self {
        self.milestone_seq = Some(seq);
        self
    }

    pub fn actor(mut self, addr: impl Into<String>) -> Self {
        self.actor = Some(addr.into());
        self
    }

    pub fn beneficiary(mut self, addr: impl Into<String>) -> Self {
        self.beneficiary = Some(addr.into());
        self
    }

    pub fn amount(mut self, amount: Wei) -> Self {
        self.amount_wei = Some(amount);
        self
    }
}

/// A stored event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: i64,
    pub kind: LedgerEventKind,
    pub tx_hash: String,
    pub block_number: u64,
    pub scheme_ledger_id: String,
    pub milestone_seq: Option<u64>,
    pub actor: Option<String>,
    pub beneficiary: Option<String>,
    pub amount_wei: Option<Wei>,
    pub archive_ref: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        let kinds = [
            LedgerEventKind::FundsDeposited,
            LedgerEventKind::ProofSubmitted,
            LedgerEventKind::MilestoneApproved,
            LedgerEventKind::PaymentReleased,
            LedgerEventKind::VendorSet,
            LedgerEventKind::QuotationStored,
            LedgerEventKind::MilestoneCreated,
            LedgerEventKind::MilestoneStatusUpdated,
            LedgerEventKind::MilestoneRejected,
            LedgerEventKind::RefundIssued,
            LedgerEventKind::FundsLocked,
            LedgerEventKind::SchemeCreated,
            LedgerEventKind::InvoiceHashStored,
        ];
        assert_eq!(kinds.len(), 13);
        for kind in kinds {
            assert_eq!(LedgerEventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LedgerEventKind::parse("Transfer"), None);
    }

    #[test]
    fn builder_fills_optional_fields() {
        let ev = NewLedgerEvent::new(LedgerEventKind::FundsDeposited, "ab".repeat(32), 7, "42")
            .actor("0x1111111111111111111111111111111111111111")
            .amount(Wei::new(100));
        assert_eq!(ev.block_number, 7);
        assert_eq!(ev.amount_wei, Some(Wei::new(100)));
        assert!(ev.milestone_seq.is_none());
        assert!(ev.archive_ref.is_none());
    }
}

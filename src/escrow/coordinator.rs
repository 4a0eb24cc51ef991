//! Escrow coordination
//!
//! Orchestrates the milestone state machine over whichever ledger
//! client is active. Precondition checks run before any write: amounts
//! must be positive, addresses well-formed, and the milestone must sit
//! in the required predecessor state. The ledger stays authoritative
//! for balances; a ledger-side rejection is terminal for that call.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use crate::activity::ActivityBus;
use crate::crypto::CidCipher;
use crate::domain::{
    normalize_address, ActivityBuilder, ActivitySeverity, Milestone, MilestoneStatus, SchemeId,
    Wei,
};
use crate::error::{EscrowError, Result};
use crate::ledger::{LedgerClient, OpReceipt, OpStatus, SchemeCreation};

pub struct EscrowCoordinator {
    ledger: Arc<dyn LedgerClient>,
    cipher: CidCipher,
    activity: ActivityBus,
}

impl EscrowCoordinator {
    pub fn new(ledger: Arc<dyn LedgerClient>, cipher: CidCipher, activity: ActivityBus) -> Self {
        Self {
            ledger,
            cipher,
            activity,
        }
    }

    /// Register a scheme on the ledger. Registering one that already
    /// exists reports `exists` instead of erroring.
    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn create_scheme(&self, scheme: SchemeId, actor: &str) -> Result<OpReceipt> {
        match self.ledger.create_scheme(scheme.ledger_id()).await? {
            SchemeCreation::Created(receipt) => {
                info!("Created scheme {} in tx {}", scheme, receipt.tx_hash);
                self.activity.publish(
                    ActivityBuilder::new("scheme_created", actor)
                        .role("fund_holder")
                        .target("scheme", scheme.to_string())
                        .metadata(json!({ "txHash": receipt.tx_hash }))
                        .build(),
                );
                Ok(OpReceipt::new(OpStatus::Created, receipt))
            }
            SchemeCreation::Exists => Ok(OpReceipt::bare(OpStatus::Exists)),
        }
    }

    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn deposit(&self, scheme: SchemeId, donor: &str, amount: Wei) -> Result<OpReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }
        let donor = normalize_address(donor)?;
        let ledger_id = scheme.ledger_id();
        if !self.ledger.scheme_exists(ledger_id).await? {
            return Err(EscrowError::SchemeNotFound(scheme.to_string()));
        }

        let receipt = self.ledger.record_deposit(ledger_id, &donor, amount).await?;
        info!("Deposited {} wei to scheme {} from {}", amount, scheme, donor);
        self.activity.publish(
            ActivityBuilder::new("funds_deposited", donor.as_str())
                .role("donor")
                .target("scheme", scheme.to_string())
                .metadata(json!({
                    "amountWei": amount.to_string(),
                    "txHash": receipt.tx_hash,
                }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Deposited, receipt))
    }

    /// Close a scheme to further deposits. One-way.
    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn lock(&self, scheme: SchemeId, actor: &str) -> Result<OpReceipt> {
        let ledger_id = scheme.ledger_id();
        if !self.ledger.scheme_exists(ledger_id).await? {
            return Err(EscrowError::SchemeNotFound(scheme.to_string()));
        }

        let receipt = self.ledger.lock_scheme(ledger_id).await?;
        info!("Locked scheme {} in tx {}", scheme, receipt.tx_hash);
        self.activity.publish(
            ActivityBuilder::new("scheme_locked", actor)
                .role("fund_holder")
                .target("scheme", scheme.to_string())
                .metadata(json!({ "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Locked, receipt))
    }

    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn create_milestone(
        &self,
        scheme: SchemeId,
        seq: u64,
        amount: Wei,
        actor: &str,
    ) -> Result<OpReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "milestone amount must be positive".to_string(),
            ));
        }
        let ledger_id = scheme.ledger_id();
        if !self.ledger.scheme_exists(ledger_id).await? {
            return Err(EscrowError::SchemeNotFound(scheme.to_string()));
        }

        let receipt = self.ledger.create_milestone(ledger_id, seq, amount).await?;
        self.activity.publish(
            ActivityBuilder::new("milestone_created", actor)
                .role("fund_holder")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({
                    "amountWei": amount.to_string(),
                    "txHash": receipt.tx_hash,
                }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::MilestoneCreated, receipt))
    }

    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn assign_vendor(
        &self,
        scheme: SchemeId,
        seq: u64,
        vendor: &str,
        actor: &str,
    ) -> Result<OpReceipt> {
        let vendor = normalize_address(vendor)?;
        self.require_transition(scheme, seq, MilestoneStatus::VendorAssigned)
            .await?;

        let receipt = self
            .ledger
            .set_vendor(scheme.ledger_id(), seq, &vendor)
            .await?;
        self.activity.publish(
            ActivityBuilder::new("vendor_assigned", actor)
                .role("fund_holder")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({ "vendor": vendor, "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::VendorSet, receipt))
    }

    /// Store the vendor's quotation reference. The reference is masked
    /// before it leaves this process.
    #[instrument(skip(self, quotation_cid), fields(scheme = %scheme))]
    pub async fn store_quotation(
        &self,
        scheme: SchemeId,
        seq: u64,
        quotation_cid: &str,
        actor: &str,
    ) -> Result<OpReceipt> {
        self.require_transition(scheme, seq, MilestoneStatus::QuotationStored)
            .await?;
        let masked = self.cipher.encrypt(quotation_cid)?;

        let receipt = self
            .ledger
            .store_quotation(scheme.ledger_id(), seq, &masked)
            .await?;
        self.activity.publish(
            ActivityBuilder::new("quotation_stored", actor)
                .role("vendor")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({ "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::QuotationStored, receipt))
    }

    /// Record the vendor's proof-of-completion reference, masked like
    /// the quotation.
    #[instrument(skip(self, proof_cid), fields(scheme = %scheme))]
    pub async fn submit_proof(
        &self,
        scheme: SchemeId,
        seq: u64,
        proof_cid: &str,
        actor: &str,
    ) -> Result<OpReceipt> {
        self.require_transition(scheme, seq, MilestoneStatus::ProofSubmitted)
            .await?;
        let masked = self.cipher.encrypt(proof_cid)?;

        let receipt = self
            .ledger
            .submit_proof(scheme.ledger_id(), seq, &masked)
            .await?;
        self.activity.publish(
            ActivityBuilder::new("proof_submitted", actor)
                .role("vendor")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({ "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::ProofSubmitted, receipt))
    }

    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn approve(&self, scheme: SchemeId, seq: u64, actor: &str) -> Result<OpReceipt> {
        self.require_transition(scheme, seq, MilestoneStatus::Approved)
            .await?;

        let receipt = self.ledger.approve_milestone(scheme.ledger_id(), seq).await?;
        self.activity.publish(
            ActivityBuilder::new("milestone_approved", actor)
                .role("approver")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({ "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Approved, receipt))
    }

    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn reject(&self, scheme: SchemeId, seq: u64, actor: &str) -> Result<OpReceipt> {
        self.require_transition(scheme, seq, MilestoneStatus::Rejected)
            .await?;

        let receipt = self.ledger.reject_milestone(scheme.ledger_id(), seq).await?;
        self.activity.publish(
            ActivityBuilder::new("milestone_rejected", actor)
                .role("approver")
                .severity(ActivitySeverity::Warning)
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({ "txHash": receipt.tx_hash }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Rejected, receipt))
    }

    /// Pay an approved milestone out to its vendor. `invoice` keys the
    /// payout; replaying it surfaces as a conflict, not a double spend.
    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn release(
        &self,
        scheme: SchemeId,
        seq: u64,
        invoice: &str,
        actor: &str,
    ) -> Result<OpReceipt> {
        let milestone = self
            .require_transition(scheme, seq, MilestoneStatus::Released)
            .await?;

        let receipt = self
            .ledger
            .release_payment(scheme.ledger_id(), seq, invoice)
            .await?;
        info!(
            "Released {} wei for milestone {}/{} in tx {}",
            milestone.amount, scheme, seq, receipt.tx_hash
        );
        self.activity.publish(
            ActivityBuilder::new("payment_released", actor)
                .role("fund_holder")
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({
                    "amountWei": milestone.amount.to_string(),
                    "vendor": milestone.vendor,
                    "invoice": invoice,
                    "txHash": receipt.tx_hash,
                }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Released, receipt))
    }

    /// Return a rejected milestone's funds to the given address.
    #[instrument(skip(self), fields(scheme = %scheme))]
    pub async fn refund(
        &self,
        scheme: SchemeId,
        seq: u64,
        to: &str,
        actor: &str,
    ) -> Result<OpReceipt> {
        let to = normalize_address(to)?;
        let milestone = self
            .require_transition(scheme, seq, MilestoneStatus::Refunded)
            .await?;

        let receipt = self.ledger.refund(scheme.ledger_id(), seq, &to).await?;
        info!(
            "Refunded {} wei for milestone {}/{} to {}",
            milestone.amount, scheme, seq, to
        );
        self.activity.publish(
            ActivityBuilder::new("refund_issued", actor)
                .role("fund_holder")
                .severity(ActivitySeverity::Warning)
                .target("milestone", milestone_target(scheme, seq))
                .metadata(json!({
                    "amountWei": milestone.amount.to_string(),
                    "to": to,
                    "txHash": receipt.tx_hash,
                }))
                .build(),
        );
        Ok(OpReceipt::new(OpStatus::Refunded, receipt))
    }

    pub async fn scheme_balance(&self, scheme: SchemeId) -> Result<Wei> {
        self.ledger.scheme_balance(scheme.ledger_id()).await
    }

    pub async fn donor_contribution(&self, scheme: SchemeId, donor: &str) -> Result<Wei> {
        let donor = normalize_address(donor)?;
        self.ledger
            .donor_contribution(scheme.ledger_id(), &donor)
            .await
    }

    pub async fn milestone(&self, scheme: SchemeId, seq: u64) -> Result<Milestone> {
        self.ledger
            .milestone(scheme.ledger_id(), seq)
            .await?
            .ok_or_else(|| EscrowError::MilestoneNotFound {
                scheme: scheme.to_string(),
                milestone: seq,
            })
    }

    /// Load the milestone and check the requested transition against
    /// the state machine before any write goes out.
    async fn require_transition(
        &self,
        scheme: SchemeId,
        seq: u64,
        to: MilestoneStatus,
    ) -> Result<Milestone> {
        let milestone = self
            .ledger
            .milestone(scheme.ledger_id(), seq)
            .await?
            .ok_or_else(|| EscrowError::MilestoneNotFound {
                scheme: scheme.to_string(),
                milestone: seq,
            })?;

        if !milestone.status.can_transition_to(to) {
            return Err(EscrowError::InvalidTransition {
                scheme: scheme.to_string(),
                milestone: seq,
                from: milestone.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(milestone)
    }
}

fn milestone_target(scheme: SchemeId, seq: u64) -> String {
    format!("{scheme}/{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CID_MASK_PREFIX;
    use crate::domain::ActivityEntry;
    use crate::ledger::{MockLedgerClient, TxReceipt};
    use tokio::sync::mpsc;

    const DONOR: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const VENDOR: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn with_mock(
        mock: MockLedgerClient,
    ) -> (EscrowCoordinator, mpsc::UnboundedReceiver<ActivityEntry>) {
        let (bus, rx) = ActivityBus::channel();
        let cipher = CidCipher::new("test-secret").unwrap();
        (EscrowCoordinator::new(Arc::new(mock), cipher, bus), rx)
    }

    fn milestone_in(status: MilestoneStatus) -> Milestone {
        Milestone {
            scheme_ledger_id: 7,
            seq: 1,
            amount: Wei::new(40),
            vendor: Some(VENDOR.to_string()),
            quotation_ref: None,
            proof_ref: None,
            status,
        }
    }

    fn receipt() -> TxReceipt {
        TxReceipt::new("ab".repeat(32), Some(12))
    }

    #[tokio::test]
    async fn deposit_rejects_zero_before_any_ledger_call() {
        let (coordinator, _rx) = with_mock(MockLedgerClient::new());
        let err = coordinator
            .deposit(SchemeId::new(), DONOR, Wei::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn deposit_rejects_malformed_address() {
        let (coordinator, _rx) = with_mock(MockLedgerClient::new());
        let err = coordinator
            .deposit(SchemeId::new(), "not-an-address", Wei::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::MalformedAddress(_)));
    }

    #[tokio::test]
    async fn deposit_on_unknown_scheme_is_not_found() {
        let mut mock = MockLedgerClient::new();
        mock.expect_scheme_exists().returning(|_| Ok(false));
        let (coordinator, _rx) = with_mock(mock);

        let err = coordinator
            .deposit(SchemeId::new(), DONOR, Wei::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::SchemeNotFound(_)));
    }

    #[tokio::test]
    async fn deposit_normalizes_the_donor_address() {
        let mut mock = MockLedgerClient::new();
        mock.expect_scheme_exists().returning(|_| Ok(true));
        mock.expect_record_deposit()
            .withf(|_, donor, amount| {
                donor == "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" && *amount == Wei::new(10)
            })
            .returning(|_, _, _| Ok(receipt()));
        let (coordinator, mut rx) = with_mock(mock);

        let out = coordinator
            .deposit(SchemeId::new(), DONOR, Wei::new(10))
            .await
            .unwrap();
        assert_eq!(out.status, OpStatus::Deposited);

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.action, "funds_deposited");
        assert_eq!(entry.metadata.unwrap()["amountWei"], "10");
    }

    #[tokio::test]
    async fn create_scheme_reports_exists_without_receipt() {
        let mut mock = MockLedgerClient::new();
        mock.expect_create_scheme()
            .returning(|_| Ok(SchemeCreation::Exists));
        let (coordinator, mut rx) = with_mock(mock);

        let out = coordinator
            .create_scheme(SchemeId::new(), "holder-1")
            .await
            .unwrap();
        assert_eq!(out.status, OpStatus::Exists);
        assert!(out.tx_hash.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn approve_requires_proof_submitted() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone()
            .returning(|_, _| Ok(Some(milestone_in(MilestoneStatus::VendorAssigned))));
        let (coordinator, _rx) = with_mock(mock);

        let err = coordinator
            .approve(SchemeId::new(), 1, "approver-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn missing_milestone_is_its_own_error() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone().returning(|_, _| Ok(None));
        let (coordinator, _rx) = with_mock(mock);

        let err = coordinator
            .approve(SchemeId::new(), 9, "approver-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::MilestoneNotFound { .. }));
    }

    #[tokio::test]
    async fn quotation_cid_is_masked_before_the_ledger_sees_it() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone()
            .returning(|_, _| Ok(Some(milestone_in(MilestoneStatus::VendorAssigned))));
        mock.expect_store_quotation()
            .withf(|_, _, stored| stored.starts_with(CID_MASK_PREFIX))
            .returning(|_, _, _| Ok(receipt()));
        let (coordinator, _rx) = with_mock(mock);

        let out = coordinator
            .store_quotation(SchemeId::new(), 1, "bafy-quote", "vendor-1")
            .await
            .unwrap();
        assert_eq!(out.status, OpStatus::QuotationStored);
    }

    #[tokio::test]
    async fn release_returns_receipt_and_logs_activity() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone()
            .returning(|_, _| Ok(Some(milestone_in(MilestoneStatus::Approved))));
        mock.expect_release_payment()
            .withf(|_, seq, invoice| *seq == 1 && invoice == "inv-7")
            .returning(|_, _, _| Ok(receipt()));
        let (coordinator, mut rx) = with_mock(mock);

        let out = coordinator
            .release(SchemeId::new(), 1, "inv-7", "holder-1")
            .await
            .unwrap();
        assert_eq!(out.status, OpStatus::Released);
        assert_eq!(out.tx_hash.unwrap(), "ab".repeat(32));
        assert_eq!(out.block_number, Some(12));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.action, "payment_released");
        let metadata = entry.metadata.unwrap();
        assert_eq!(metadata["invoice"], "inv-7");
        assert_eq!(metadata["amountWei"], "40");
    }

    #[tokio::test]
    async fn release_requires_approved_state() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone()
            .returning(|_, _| Ok(Some(milestone_in(MilestoneStatus::ProofSubmitted))));
        let (coordinator, _rx) = with_mock(mock);

        let err = coordinator
            .release(SchemeId::new(), 1, "inv-7", "holder-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn refund_requires_rejected_state() {
        let mut mock = MockLedgerClient::new();
        mock.expect_milestone()
            .returning(|_, _| Ok(Some(milestone_in(MilestoneStatus::Approved))));
        let (coordinator, _rx) = with_mock(mock);

        let err = coordinator
            .refund(SchemeId::new(), 1, DONOR, "holder-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTransition { .. }));
    }
}

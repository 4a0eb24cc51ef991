//! Remote ledger client
//!
//! Submits signed transactions to the MilestoneEscrow contract and reads
//! balances and milestone state back from it. The contract is the
//! balance-of-record; this client never caches.

use alloy::network::EthereumWallet;
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::info;

use crate::domain::{Milestone, MilestoneStatus, Wei};
use crate::error::{EscrowError, Result};
use crate::sync::{LogSource, RawLog};

use super::{LedgerClient, SchemeCreation, TxReceipt};

// Generate contract bindings
sol! {
    #[sol(rpc)]
    interface IMilestoneEscrow {
        function createScheme(uint256 schemeId) external;

        function schemeExists(uint256 schemeId) external view returns (bool);

        function lockScheme(uint256 schemeId) external;

        function deposit(uint256 schemeId) external payable;

        function getSchemeBalance(uint256 schemeId) external view returns (uint256);

        function getDonorContribution(uint256 schemeId, address donor) external view returns (uint256);

        function createMilestone(uint256 schemeId, uint256 milestoneId, uint256 amount) external;

        function setVendor(uint256 schemeId, uint256 milestoneId, address vendor) external;

        function storeQuotation(uint256 schemeId, uint256 milestoneId, string calldata quotationCid) external;

        function submitProof(uint256 schemeId, uint256 milestoneId, string calldata proofCid) external;

        function approveMilestone(uint256 schemeId, uint256 milestoneId) external;

        function rejectMilestone(uint256 schemeId, uint256 milestoneId) external;

        function releasePayment(uint256 schemeId, uint256 milestoneId, bytes32 invoiceHash) external;

        function refund(uint256 schemeId, uint256 milestoneId, address to) external;

        function getMilestone(uint256 schemeId, uint256 milestoneId) external view
            returns (uint256 amount, address vendor, string memory quotationCid, string memory proofCid, uint8 status);

        event SchemeCreated(uint256 indexed schemeId, address indexed creator);
        event FundsDeposited(uint256 indexed schemeId, address indexed donor, uint256 amount);
        event FundsLocked(uint256 indexed schemeId, address indexed locker);
        event MilestoneCreated(uint256 indexed schemeId, uint256 indexed milestoneId, uint256 amount);
        event VendorSet(uint256 indexed schemeId, uint256 indexed milestoneId, address vendor);
        event QuotationStored(uint256 indexed schemeId, uint256 indexed milestoneId, string quotationCid);
        event ProofSubmitted(uint256 indexed schemeId, uint256 indexed milestoneId, address indexed vendor, string proofCid);
        event MilestoneApproved(uint256 indexed schemeId, uint256 indexed milestoneId, address approver);
        event MilestoneRejected(uint256 indexed schemeId, uint256 indexed milestoneId, address rejector);
        event MilestoneStatusUpdated(uint256 indexed schemeId, uint256 indexed milestoneId, uint8 status);
        event PaymentReleased(uint256 indexed schemeId, uint256 indexed milestoneId, address indexed vendor, uint256 amount);
        event RefundIssued(uint256 indexed schemeId, uint256 indexed milestoneId, address indexed recipient, uint256 amount);
        event InvoiceHashStored(uint256 indexed schemeId, uint256 indexed milestoneId, bytes32 invoiceHash);
    }
}

/// Remote ledger configuration
#[derive(Debug, Clone)]
pub struct RemoteLedgerConfig {
    /// RPC URL of the chain carrying the escrow contract
    pub rpc_url: String,
    /// MilestoneEscrow contract address
    pub contract_address: Address,
    /// Private key for signing writes; reads work without one
    pub signer_key: Option<String>,
    /// Chain ID
    pub chain_id: u64,
}

impl RemoteLedgerConfig {
    /// Load configuration from environment variables. `None` (no RPC URL
    /// or contract address) selects demo mode.
    pub fn from_env() -> Option<Self> {
        let rpc_url = std::env::var("ESCROW_RPC_URL").ok()?;
        let contract_address = std::env::var("ESCROW_CONTRACT_ADDRESS")
            .ok()
            .and_then(|s| s.parse().ok())?;
        let signer_key = std::env::var("ESCROW_SIGNER_KEY").ok();
        let chain_id = std::env::var("ESCROW_CHAIN_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(11155111);

        Some(Self {
            rpc_url,
            contract_address,
            signer_key,
            chain_id,
        })
    }
}

/// Client for the escrow contract on the remote chain.
pub struct RemoteLedgerClient {
    config: RemoteLedgerConfig,
}

impl RemoteLedgerClient {
    pub fn new(config: RemoteLedgerConfig) -> Self {
        Self { config }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Writes need a signer; reads do not.
    fn signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .config
            .signer_key
            .as_deref()
            .ok_or_else(|| EscrowError::Configuration("no signer key configured".to_string()))?;
        key.parse()
            .map_err(|e| EscrowError::Configuration(format!("invalid signer key: {}", e)))
    }
}

#[async_trait]
impl LedgerClient for RemoteLedgerClient {
    async fn scheme_exists(&self, scheme: u128) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let exists = contract
            .schemeExists(U256::from(scheme))
            .call()
            .await
            .map_err(|e| classify("schemeExists", e))?;
        Ok(exists._0)
    }

    async fn scheme_balance(&self, scheme: u128) -> Result<Wei> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let balance = contract
            .getSchemeBalance(U256::from(scheme))
            .call()
            .await
            .map_err(|e| classify("getSchemeBalance", e))?;
        to_wei("getSchemeBalance", balance._0)
    }

    async fn donor_contribution(&self, scheme: u128, donor: &str) -> Result<Wei> {
        let donor = parse_address(donor)?;
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let amount = contract
            .getDonorContribution(U256::from(scheme), donor)
            .call()
            .await
            .map_err(|e| classify("getDonorContribution", e))?;
        to_wei("getDonorContribution", amount._0)
    }

    async fn milestone(&self, scheme: u128, seq: u64) -> Result<Option<Milestone>> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let m = contract
            .getMilestone(U256::from(scheme), U256::from(seq))
            .call()
            .await
            .map_err(|e| classify("getMilestone", e))?;

        // A milestone that was never created reads back zeroed; amount > 0
        // is guaranteed at creation.
        if m.amount == U256::ZERO {
            return Ok(None);
        }
        let status = MilestoneStatus::from_code(m.status).ok_or_else(|| {
            EscrowError::Internal(format!("unknown on-chain milestone status {}", m.status))
        })?;
        Ok(Some(Milestone {
            scheme_ledger_id: scheme,
            seq,
            amount: to_wei("getMilestone", m.amount)?,
            vendor: nonzero_address(m.vendor),
            quotation_ref: nonempty(m.quotationCid),
            proof_ref: nonempty(m.proofCid),
            status,
        }))
    }

    async fn create_scheme(&self, scheme: u128) -> Result<SchemeCreation> {
        if self.scheme_exists(scheme).await? {
            return Ok(SchemeCreation::Exists);
        }

        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .createScheme(U256::from(scheme))
            .send()
            .await
            .map_err(|e| classify("createScheme", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("createScheme receipt: {}", e)))?;

        info!(
            "Scheme {} registered in tx {}",
            scheme,
            hex::encode(receipt.transaction_hash.0)
        );
        Ok(SchemeCreation::Created(to_receipt(&receipt)))
    }

    async fn lock_scheme(&self, scheme: u128) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .lockScheme(U256::from(scheme))
            .send()
            .await
            .map_err(|e| classify("lockScheme", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("lockScheme receipt: {}", e)))?;

        info!(
            "Scheme {} locked in tx {}",
            scheme,
            hex::encode(receipt.transaction_hash.0)
        );
        Ok(to_receipt(&receipt))
    }

    async fn record_deposit(&self, scheme: u128, donor: &str, amount: Wei) -> Result<TxReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }
        // The donor address travels in the transaction sender, not the
        // calldata; it is validated here so a bad address fails before
        // any wire traffic.
        parse_address(donor)?;

        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .deposit(U256::from(scheme))
            .value(U256::from(amount.as_u128()))
            .send()
            .await
            .map_err(|e| classify("deposit", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("deposit receipt: {}", e)))?;

        info!(
            "Deposit of {} wei to scheme {} confirmed in tx {} (block {})",
            amount,
            scheme,
            hex::encode(receipt.transaction_hash.0),
            receipt.block_number.unwrap_or(0)
        );
        Ok(to_receipt(&receipt))
    }

    async fn create_milestone(&self, scheme: u128, seq: u64, amount: Wei) -> Result<TxReceipt> {
        if amount.is_zero() {
            return Err(EscrowError::InvalidAmount(
                "milestone amount must be positive".to_string(),
            ));
        }

        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .createMilestone(U256::from(scheme), U256::from(seq), U256::from(amount.as_u128()))
            .send()
            .await
            .map_err(|e| classify("createMilestone", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("createMilestone receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn set_vendor(&self, scheme: u128, seq: u64, vendor: &str) -> Result<TxReceipt> {
        let vendor = parse_address(vendor)?;

        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .setVendor(U256::from(scheme), U256::from(seq), vendor)
            .send()
            .await
            .map_err(|e| classify("setVendor", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("setVendor receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn store_quotation(
        &self,
        scheme: u128,
        seq: u64,
        quotation_ref: &str,
    ) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .storeQuotation(U256::from(scheme), U256::from(seq), quotation_ref.to_string())
            .send()
            .await
            .map_err(|e| classify("storeQuotation", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("storeQuotation receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn submit_proof(&self, scheme: u128, seq: u64, proof_ref: &str) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .submitProof(U256::from(scheme), U256::from(seq), proof_ref.to_string())
            .send()
            .await
            .map_err(|e| classify("submitProof", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("submitProof receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn approve_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .approveMilestone(U256::from(scheme), U256::from(seq))
            .send()
            .await
            .map_err(|e| classify("approveMilestone", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("approveMilestone receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn reject_milestone(&self, scheme: u128, seq: u64) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .rejectMilestone(U256::from(scheme), U256::from(seq))
            .send()
            .await
            .map_err(|e| classify("rejectMilestone", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("rejectMilestone receipt: {}", e)))?;

        Ok(to_receipt(&receipt))
    }

    async fn release_payment(&self, scheme: u128, seq: u64, invoice: &str) -> Result<TxReceipt> {
        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .releasePayment(U256::from(scheme), U256::from(seq), invoice_hash(invoice))
            .send()
            .await
            .map_err(|e| classify("releasePayment", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("releasePayment receipt: {}", e)))?;

        info!(
            "Release for milestone {}/{} (invoice {}) confirmed in tx {} (block {})",
            scheme,
            seq,
            invoice,
            hex::encode(receipt.transaction_hash.0),
            receipt.block_number.unwrap_or(0)
        );
        Ok(to_receipt(&receipt))
    }

    async fn refund(&self, scheme: u128, seq: u64, to: &str) -> Result<TxReceipt> {
        let to = parse_address(to)?;

        let signer = self.signer()?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
            );
        let contract = IMilestoneEscrow::new(self.config.contract_address, &provider);

        let pending = contract
            .refund(U256::from(scheme), U256::from(seq), to)
            .send()
            .await
            .map_err(|e| classify("refund", e))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::Rpc(format!("refund receipt: {}", e)))?;

        info!(
            "Refund for milestone {}/{} confirmed in tx {}",
            scheme,
            seq,
            hex::encode(receipt.transaction_hash.0)
        );
        Ok(to_receipt(&receipt))
    }
}

#[async_trait]
impl LogSource for RemoteLedgerClient {
    async fn head_block(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        provider
            .get_block_number()
            .await
            .map_err(|e| EscrowError::Rpc(format!("get_block_number: {}", e)))
    }

    async fn fetch_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawLog>> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| EscrowError::Configuration(format!("invalid rpc url: {}", e)))?,
        );
        let filter = Filter::new()
            .address(self.config.contract_address)
            .from_block(from_block)
            .to_block(to_block);
        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(|e| EscrowError::Rpc(format!("get_logs: {}", e)))?;
        Ok(logs.iter().filter_map(RawLog::from_rpc).collect())
    }
}

fn to_receipt(receipt: &alloy::rpc::types::TransactionReceipt) -> TxReceipt {
    TxReceipt::new(hex::encode(receipt.transaction_hash.0), receipt.block_number)
}

fn to_wei(context: &str, value: U256) -> Result<Wei> {
    let raw: u128 = value
        .try_into()
        .map_err(|_| EscrowError::Internal(format!("{}: amount exceeds 128 bits", context)))?;
    Ok(Wei::new(raw))
}

fn parse_address(addr: &str) -> Result<Address> {
    addr.parse()
        .map_err(|_| EscrowError::MalformedAddress(addr.to_string()))
}

/// bytes32 invoice key passed to `releasePayment`.
fn invoice_hash(invoice: &str) -> B256 {
    keccak256(invoice.as_bytes())
}

fn nonzero_address(addr: Address) -> Option<String> {
    (addr != Address::ZERO).then(|| format!("{:#x}", addr))
}

fn nonempty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Revert reasons are terminal rejections; anything else on the wire is
/// retryable.
fn classify(context: &str, e: impl std::fmt::Display) -> EscrowError {
    let msg = e.to_string();
    if msg.contains("revert") {
        EscrowError::LedgerRejected(format!("{}: {}", context, msg))
    } else {
        EscrowError::Rpc(format!("{}: {}", context, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_hash_is_deterministic() {
        assert_eq!(invoice_hash("inv-001"), invoice_hash("inv-001"));
        assert_ne!(invoice_hash("inv-001"), invoice_hash("inv-002"));
    }

    #[test]
    fn zero_vendor_reads_as_unassigned() {
        assert_eq!(nonzero_address(Address::ZERO), None);
        let addr: Address = "0xcccccccccccccccccccccccccccccccccccccccc"
            .parse()
            .unwrap();
        assert_eq!(
            nonzero_address(addr).as_deref(),
            Some("0xcccccccccccccccccccccccccccccccccccccccc")
        );
    }

    #[test]
    fn reverts_classify_as_rejections() {
        let err = classify("releasePayment", "execution reverted: not approved");
        assert!(matches!(err, EscrowError::LedgerRejected(_)));

        let err = classify("getSchemeBalance", "connection refused");
        assert!(matches!(err, EscrowError::Rpc(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn empty_refs_read_as_absent() {
        assert_eq!(nonempty(String::new()), None);
        assert_eq!(nonempty("bafy-cid".to_string()).as_deref(), Some("bafy-cid"));
    }
}

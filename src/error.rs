//! Error types shared across the escrow service

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur in escrow, sync, and audit operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (missing signer key, contract address, secret)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-positive or otherwise unusable amount
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Address failed validation before any ledger call
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// Milestone is not in the required predecessor state
    #[error("invalid milestone transition for {scheme}/{milestone}: {from} -> {to}")]
    InvalidTransition {
        scheme: String,
        milestone: u64,
        from: String,
        to: String,
    },

    /// Milestone not found on the active ledger
    #[error("milestone not found: {scheme}/{milestone}")]
    MilestoneNotFound { scheme: String, milestone: u64 },

    /// Scheme not found on the active ledger
    #[error("scheme not found: {0}")]
    SchemeNotFound(String),

    /// The ledger refused the operation; terminal for this call
    #[error("ledger rejected operation: {0}")]
    LedgerRejected(String),

    /// Transport-level failure talking to the remote ledger
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A payout for this invoice key was already recorded
    #[error("release conflict: invoice {invoice} already paid")]
    ReleaseConflict { invoice: String },

    /// CID masking failure
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Object-storage archival failure
    #[error("archive error: {0}")]
    Archive(String),

    /// No audit summary recorded for the requested date
    #[error("no audit summary for {0}")]
    SummaryNotFound(NaiveDate),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Transient failures are safe to retry on the next scheduled run.
    pub fn is_transient(&self) -> bool {
        matches!(self, EscrowError::Rpc(_))
    }

    /// Precondition violations are client errors raised before any I/O.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EscrowError::InvalidAmount(_)
                | EscrowError::MalformedAddress(_)
                | EscrowError::InvalidTransition { .. }
                | EscrowError::MilestoneNotFound { .. }
                | EscrowError::SchemeNotFound(_)
        )
    }
}

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, EscrowError>;

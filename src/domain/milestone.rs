//! Milestone state machine
//!
//! A milestone moves through a fixed sequence of states with no skipping:
//! `Created -> VendorAssigned -> QuotationStored -> ProofSubmitted`, then
//! either `Approved -> Released` or `Rejected -> Refunded`. The numeric
//! codes mirror the escrow contract's status enum, so decoded
//! status-update events map directly.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Wei;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Created,
    VendorAssigned,
    QuotationStored,
    ProofSubmitted,
    Approved,
    Rejected,
    Released,
    Refunded,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Created => "created",
            MilestoneStatus::VendorAssigned => "vendor_assigned",
            MilestoneStatus::QuotationStored => "quotation_stored",
            MilestoneStatus::ProofSubmitted => "proof_submitted",
            MilestoneStatus::Approved => "approved",
            MilestoneStatus::Rejected => "rejected",
            MilestoneStatus::Released => "released",
            MilestoneStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(MilestoneStatus::Created),
            "vendor_assigned" => Some(MilestoneStatus::VendorAssigned),
            "quotation_stored" => Some(MilestoneStatus::QuotationStored),
            "proof_submitted" => Some(MilestoneStatus::ProofSubmitted),
            "approved" => Some(MilestoneStatus::Approved),
            "rejected" => Some(MilestoneStatus::Rejected),
            "released" => Some(MilestoneStatus::Released),
            "refunded" => Some(MilestoneStatus::Refunded),
            _ => None,
        }
    }

    /// Contract-side status code.
    pub fn code(&self) -> u8 {
        match self {
            MilestoneStatus::Created => 0,
            MilestoneStatus::VendorAssigned => 1,
            MilestoneStatus::QuotationStored => 2,
            MilestoneStatus::ProofSubmitted => 3,
            MilestoneStatus::Approved => 4,
            MilestoneStatus::Rejected => 5,
            MilestoneStatus::Released => 6,
            MilestoneStatus::Refunded => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MilestoneStatus::Created),
            1 => Some(MilestoneStatus::VendorAssigned),
            2 => Some(MilestoneStatus::QuotationStored),
            3 => Some(MilestoneStatus::ProofSubmitted),
            4 => Some(MilestoneStatus::Approved),
            5 => Some(MilestoneStatus::Rejected),
            6 => Some(MilestoneStatus::Released),
            7 => Some(MilestoneStatus::Refunded),
            _ => None,
        }
    }

    /// Whether `to` is a legal single-step successor of `self`.
    pub fn can_transition_to(&self, to: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, to),
            (Created, VendorAssigned)
                | (VendorAssigned, QuotationStored)
                | (QuotationStored, ProofSubmitted)
                | (ProofSubmitted, Approved)
                | (ProofSubmitted, Rejected)
                | (Approved, Released)
                | (Rejected, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MilestoneStatus::Released | MilestoneStatus::Refunded)
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Milestone as read back from the active ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub scheme_ledger_id: u128,
    pub seq: u64,
    pub amount: Wei,
    /// Assigned vendor settlement address, empty until `assignVendor`.
    pub vendor: Option<String>,
    pub quotation_ref: Option<String>,
    pub proof_ref: Option<String>,
    pub status: MilestoneStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        use MilestoneStatus::*;
        let chain = [
            Created,
            VendorAssigned,
            QuotationStored,
            ProofSubmitted,
            Approved,
            Released,
        ];
        for pair in chain.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
        assert!(ProofSubmitted.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Refunded));
    }

    #[test]
    fn skipping_states_is_illegal() {
        use MilestoneStatus::*;
        assert!(!Created.can_transition_to(QuotationStored));
        assert!(!Created.can_transition_to(ProofSubmitted));
        assert!(!VendorAssigned.can_transition_to(ProofSubmitted));
        assert!(!QuotationStored.can_transition_to(Approved));
        assert!(!Created.can_transition_to(Released));
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use MilestoneStatus::*;
        for to in [
            Created,
            VendorAssigned,
            QuotationStored,
            ProofSubmitted,
            Approved,
            Rejected,
            Released,
            Refunded,
        ] {
            assert!(!Released.can_transition_to(to));
            assert!(!Refunded.can_transition_to(to));
        }
        assert!(Released.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(!Approved.is_terminal());
    }

    #[test]
    fn rejection_branch_excludes_release() {
        use MilestoneStatus::*;
        assert!(!Rejected.can_transition_to(Released));
        assert!(!Approved.can_transition_to(Refunded));
    }

    #[test]
    fn codes_round_trip() {
        for code in 0..=7u8 {
            let status = MilestoneStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
            assert_eq!(MilestoneStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MilestoneStatus::from_code(8), None);
        assert_eq!(MilestoneStatus::parse("bogus"), None);
    }
}

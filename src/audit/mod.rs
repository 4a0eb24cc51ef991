//! Tamper-evident audit trail
//!
//! Activity entries are hashed into a per-day Merkle tree; the root is
//! stored as a [`DailyAuditSummary`](crate::domain::DailyAuditSummary)
//! and can later be re-derived to detect edits or deletions.

mod builder;
mod merkle;

pub use builder::{
    spawn_audit_scheduler, AuditCommand, AuditScheduler, AuditTrailBuilder, AuditVerification,
};
pub use merkle::{inclusion_proof, leaf_hash, merkle_root, InclusionProof, ProofStep};

//! Identifier mapping
//!
//! Donors and vendors without a real wallet settle to a synthetic
//! address derived from their opaque 128-bit platform id. The
//! scheme-side integer mapping is `SchemeId::ledger_id`.

use alloy::primitives::{keccak256, Address};
use uuid::Uuid;

/// Synthetic settlement address: low 20 bytes of Keccak-256 over the
/// raw id bytes, formatted as lowercase 0x hex. Deterministic, so the
/// same participant always settles to the same address.
pub fn settlement_address(id: Uuid) -> String {
    let digest = keccak256(id.as_bytes());
    let addr = Address::from_slice(&digest[12..]);
    format!("{:#x}", addr)
}

//! Raw log decoding
//!
//! Dispatches each raw log by its topic-0 signature to one of the
//! thirteen known escrow event decoders. Unknown signatures are skipped
//! so newer contract deployments do not break older services.

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolEvent;
use tracing::warn;

use crate::domain::{LedgerEventKind, NewLedgerEvent, Wei};
use crate::ledger::IMilestoneEscrow;

use super::source::RawLog;

/// Decode one raw log into an insertable event. `None` when the log is
/// not one of ours, or its payload does not decode.
pub fn decode_log(log: &RawLog) -> Option<NewLedgerEvent> {
    let topic0 = *log.topics.first()?;

    match topic0 {
        t if t == IMilestoneEscrow::SchemeCreated::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::SchemeCreated>(log)?;
            Some(
                base(log, LedgerEventKind::SchemeCreated, ev.schemeId)
                    .actor(addr_text(ev.creator)),
            )
        }
        t if t == IMilestoneEscrow::FundsDeposited::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::FundsDeposited>(log)?;
            Some(
                base(log, LedgerEventKind::FundsDeposited, ev.schemeId)
                    .actor(addr_text(ev.donor))
                    .amount(wei(ev.amount)?),
            )
        }
        t if t == IMilestoneEscrow::FundsLocked::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::FundsLocked>(log)?;
            Some(base(log, LedgerEventKind::FundsLocked, ev.schemeId).actor(addr_text(ev.locker)))
        }
        t if t == IMilestoneEscrow::MilestoneCreated::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::MilestoneCreated>(log)?;
            Some(
                base(log, LedgerEventKind::MilestoneCreated, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .amount(wei(ev.amount)?),
            )
        }
        t if t == IMilestoneEscrow::VendorSet::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::VendorSet>(log)?;
            Some(
                base(log, LedgerEventKind::VendorSet, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .beneficiary(addr_text(ev.vendor)),
            )
        }
        t if t == IMilestoneEscrow::QuotationStored::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::QuotationStored>(log)?;
            let mut event = base(log, LedgerEventKind::QuotationStored, ev.schemeId)
                .milestone_seq(seq(ev.milestoneId)?);
            event.archive_ref = Some(ev.quotationCid);
            Some(event)
        }
        t if t == IMilestoneEscrow::ProofSubmitted::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::ProofSubmitted>(log)?;
            let mut event = base(log, LedgerEventKind::ProofSubmitted, ev.schemeId)
                .milestone_seq(seq(ev.milestoneId)?)
                .actor(addr_text(ev.vendor));
            event.archive_ref = Some(ev.proofCid);
            Some(event)
        }
        t if t == IMilestoneEscrow::MilestoneApproved::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::MilestoneApproved>(log)?;
            Some(
                base(log, LedgerEventKind::MilestoneApproved, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .actor(addr_text(ev.approver)),
            )
        }
        t if t == IMilestoneEscrow::MilestoneRejected::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::MilestoneRejected>(log)?;
            Some(
                base(log, LedgerEventKind::MilestoneRejected, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .actor(addr_text(ev.rejector)),
            )
        }
        t if t == IMilestoneEscrow::MilestoneStatusUpdated::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::MilestoneStatusUpdated>(log)?;
            Some(
                base(log, LedgerEventKind::MilestoneStatusUpdated, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?),
            )
        }
        t if t == IMilestoneEscrow::PaymentReleased::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::PaymentReleased>(log)?;
            Some(
                base(log, LedgerEventKind::PaymentReleased, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .beneficiary(addr_text(ev.vendor))
                    .amount(wei(ev.amount)?),
            )
        }
        t if t == IMilestoneEscrow::RefundIssued::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::RefundIssued>(log)?;
            Some(
                base(log, LedgerEventKind::RefundIssued, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?)
                    .beneficiary(addr_text(ev.recipient))
                    .amount(wei(ev.amount)?),
            )
        }
        t if t == IMilestoneEscrow::InvoiceHashStored::SIGNATURE_HASH => {
            let ev = decode_as::<IMilestoneEscrow::InvoiceHashStored>(log)?;
            Some(
                base(log, LedgerEventKind::InvoiceHashStored, ev.schemeId)
                    .milestone_seq(seq(ev.milestoneId)?),
            )
        }
        _ => None,
    }
}

fn decode_as<E: SolEvent>(log: &RawLog) -> Option<E> {
    match E::decode_raw_log(log.topics.iter().copied(), &log.data, true) {
        Ok(ev) => Some(ev),
        Err(e) => {
            warn!(
                "Failed to decode {} log in tx {}: {}",
                E::SIGNATURE,
                log.tx_hash,
                e
            );
            None
        }
    }
}

fn base(log: &RawLog, kind: LedgerEventKind, scheme: U256) -> NewLedgerEvent {
    NewLedgerEvent::new(kind, log.tx_hash.clone(), log.block_number, scheme.to_string())
}

fn addr_text(addr: Address) -> String {
    format!("{:#x}", addr)
}

fn wei(value: U256) -> Option<Wei> {
    value.try_into().ok().map(Wei::new)
}

fn seq(value: U256) -> Option<u64> {
    value.try_into().ok()
}

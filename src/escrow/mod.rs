//! Escrow orchestration

mod coordinator;

pub use coordinator::EscrowCoordinator;

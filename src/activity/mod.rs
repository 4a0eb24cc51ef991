//! Activity-log publishing
//!
//! Escrow operations publish entries to an in-process channel; a
//! decoupled writer task persists them. Visibility is eventually
//! consistent with the operation that produced an entry.

mod bus;

pub use bus::{spawn_activity_writer, ActivityBus};

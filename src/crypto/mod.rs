//! Cryptographic utilities for the escrow service
//!
//! CID masking: authenticated symmetric encryption for externally
//! visible content references before they hit the database.

mod cid;

pub use cid::{CidCipher, CID_MASK_PREFIX};

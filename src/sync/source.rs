//! Raw log access for the sync engine
//!
//! The engine only needs a head block number and a window of raw logs;
//! both come from the RPC provider in production and from scripted
//! fixtures in tests.

use alloy::primitives::B256;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// One raw log entry as returned by the log query.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    /// Lowercase hex, no 0x prefix.
    pub tx_hash: String,
    pub block_number: u64,
}

impl RawLog {
    /// Convert an RPC log entry; pending logs (no hash or block yet)
    /// are dropped.
    pub fn from_rpc(log: &alloy::rpc::types::Log) -> Option<Self> {
        let tx_hash = log.transaction_hash?;
        let block_number = log.block_number?;
        Some(Self {
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.to_vec(),
            tx_hash: hex::encode(tx_hash.0),
            block_number,
        })
    }
}

/// Where the engine reads chain state from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current chain head block number.
    async fn head_block(&self) -> Result<u64>;

    /// All escrow-contract logs in `[from_block, to_block]`, inclusive.
    async fn fetch_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawLog>>;
}

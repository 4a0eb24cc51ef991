//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use alloy::primitives::LogData;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use fundgate::error::Result;
use fundgate::sync::{LogSource, RawLog};
use fundgate::{EscrowError, SchemeId};

/// Donor settlement address used across tests
pub const DONOR: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Second donor
pub const DONOR_2: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

/// Vendor settlement address
pub const VENDOR: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Fund holder actor id
pub const HOLDER: &str = "fund-holder-1";

/// Fixed scheme id
pub fn test_scheme() -> SchemeId {
    SchemeId::from_uuid(Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap())
}

/// Fresh in-memory database with migrations applied. A single
/// connection: each new connection to `:memory:` would be its own
/// empty database, and these tests share the pool across tasks.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    fundgate::migrations::run_sqlite(&pool).await.unwrap();
    pool
}

/// Build a raw log from an encoded contract event.
pub fn raw_log(data: LogData, tx_hash: &str, block: u64) -> RawLog {
    RawLog {
        topics: data.topics().to_vec(),
        data: data.data.to_vec(),
        tx_hash: tx_hash.to_string(),
        block_number: block,
    }
}

/// Log source replaying a fixed script.
pub struct ScriptedLogSource {
    head: u64,
    logs: Vec<RawLog>,
}

impl ScriptedLogSource {
    pub fn new(head: u64, logs: Vec<RawLog>) -> Self {
        Self { head, logs }
    }
}

#[async_trait]
impl LogSource for ScriptedLogSource {
    async fn head_block(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn fetch_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawLog>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| log.block_number >= from_block && log.block_number <= to_block)
            .cloned()
            .collect())
    }
}

/// Log source whose fetch always fails with a transient RPC error.
pub struct FailingLogSource {
    pub head: u64,
}

#[async_trait]
impl LogSource for FailingLogSource {
    async fn head_block(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn fetch_logs(&self, _from_block: u64, _to_block: u64) -> Result<Vec<RawLog>> {
        Err(EscrowError::Rpc("scripted fetch failure".to_string()))
    }
}

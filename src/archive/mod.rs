//! Event archival
//!
//! Deposit and payment-release events get their details copied to
//! external object storage, and the returned reference is attached to
//! the stored event. Archival is best-effort: a failure is logged and
//! the event stays queued for the next sync run.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::domain::LedgerEvent;
use crate::error::{EscrowError, Result};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload raw bytes, returning an opaque reference to the stored
    /// object.
    async fn upload(&self, bytes: Vec<u8>, filename: &str, content_type: &str) -> Result<String>;

    /// Serialize a value and upload it as a JSON document.
    async fn upload_json(&self, value: &serde_json::Value, filename: &str) -> Result<String> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| EscrowError::Archive(format!("serialize {filename}: {e}")))?;
        self.upload(bytes, filename, "application/json").await
    }
}

/// The JSON document archived for a money-movement event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDocument {
    pub event: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub scheme_ledger_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_wei: Option<String>,
    pub observed_at: String,
}

impl ArchiveDocument {
    pub fn from_event(event: &LedgerEvent) -> Self {
        Self {
            event: event.kind.as_str().to_string(),
            tx_hash: event.tx_hash.clone(),
            block_number: event.block_number,
            scheme_ledger_id: event.scheme_ledger_id.clone(),
            milestone_seq: event.milestone_seq,
            actor: event.actor.clone(),
            beneficiary: event.beneficiary.clone(),
            amount_wei: event.amount_wei.map(|w| w.to_string()),
            observed_at: event.observed_at.to_rfc3339(),
        }
    }

    /// One document per stored event row; the name carries the full
    /// deduplication key.
    pub fn filename(&self) -> String {
        format!(
            "events/{}-{}-{}.json",
            self.tx_hash, self.event, self.block_number
        )
    }
}

/// In-process store used in demo mode and tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, filename: &str) -> Option<Vec<u8>> {
        self.lock().get(filename).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, _content_type: &str) -> Result<String> {
        self.lock().insert(filename.to_string(), bytes);
        Ok(format!("mem://{filename}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_json_stores_serialized_bytes() {
        let store = InMemoryObjectStore::new();
        let value = serde_json::json!({"event": "FundsDeposited", "amountWei": "100"});

        let reference = store.upload_json(&value, "events/test.json").await.unwrap();
        assert_eq!(reference, "mem://events/test.json");

        let bytes = store.contents("events/test.json").unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["event"], "FundsDeposited");
    }

    #[test]
    fn filename_carries_the_dedup_key() {
        let document = ArchiveDocument {
            event: "PaymentReleased".to_string(),
            tx_hash: "ab".repeat(32),
            block_number: 7,
            scheme_ledger_id: "42".to_string(),
            milestone_seq: Some(1),
            actor: None,
            beneficiary: None,
            amount_wei: Some("40".to_string()),
            observed_at: "2026-02-10T00:00:00+00:00".to_string(),
        };
        assert_eq!(
            document.filename(),
            format!("events/{}-PaymentReleased-7.json", "ab".repeat(32))
        );
    }
}

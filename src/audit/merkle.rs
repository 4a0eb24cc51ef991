//! Merkle commitment over activity-log entries
//!
//! Leaves are hex SHA-256 strings. Each level pairs adjacent hashes,
//! `parent = SHA-256(left ∥ right)` over the hex text; a level with an
//! odd count duplicates its last hash as its own pair partner. A single
//! leaf is its own root.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::ActivityRecord;

/// Hash one activity entry into a leaf:
/// `SHA-256(id ∥ actor ∥ action ∥ RFC 3339 timestamp)`, hex encoded.
/// Only these four fields are committed; metadata stays mutable.
pub fn leaf_hash(entry: &ActivityRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.id.to_string().as_bytes());
    hasher.update(entry.actor.as_bytes());
    hasher.update(entry.action.as_bytes());
    hasher.update(entry.created_at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

fn parent_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

fn next_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity((level.len() + 1) / 2);
    for pair in level.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        next.push(parent_hash(left, right));
    }
    next
}

/// Fold leaves up to the root. `None` for an empty set.
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.pop()
}

/// One step of a sibling path: the hash to combine with and which side
/// the proven hash sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    /// Whether the proven hash is the left child at this level.
    pub is_left: bool,
}

/// Sibling path from one leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf: String,
    pub leaf_index: usize,
    pub path: Vec<ProofStep>,
}

impl InclusionProof {
    /// Fold the path back up and compare against a recorded root.
    pub fn verify(&self, root: &str) -> bool {
        let mut current = self.leaf.clone();
        for step in &self.path {
            current = if step.is_left {
                parent_hash(&current, &step.sibling)
            } else {
                parent_hash(&step.sibling, &current)
            };
        }
        current == root
    }
}

/// Build the sibling path for the leaf at `index`. A duplicated last
/// leaf is its own sibling, mirroring the root construction.
pub fn inclusion_proof(leaves: &[String], index: usize) -> Option<InclusionProof> {
    if index >= leaves.len() {
        return None;
    }

    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        let is_left = idx % 2 == 0;
        let sibling_idx = if is_left { idx + 1 } else { idx - 1 };
        let sibling = level.get(sibling_idx).unwrap_or(&level[idx]).clone();
        path.push(ProofStep { sibling, is_left });

        level = next_level(&level);
        idx /= 2;
    }

    Some(InclusionProof {
        leaf: leaves[index].clone(),
        leaf_index: index,
        path,
    })
}

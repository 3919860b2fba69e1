// src/verification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::merkle::{hex_hash, MerkleTree, ProofStep};

/// Answer to a `verify_transaction` query.
///
/// Always a total, well-typed result: lookup misses and not-yet-confirmed
/// states are reported through `verified = false` plus `error`, never as an
/// `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True iff the transaction sits in a confirmed anchor.
    pub verified: bool,
    /// The anchor the transaction is mapped to, once its batch is cut.
    pub anchor_id: Option<String>,
    /// Merkle root of that anchor, lowercase hex.
    pub merkle_root: Option<String>,
    /// Public-chain transaction hash, once confirmed.
    pub public_chain_tx_hash: Option<String>,
    /// Confirmation time, once confirmed.
    pub anchored_at: Option<DateTime<Utc>>,
    /// Why `verified` is false: "not found", "pending in batch queue", or the
    /// anchor's status name.
    pub error: Option<String>,
}

impl VerificationResult {
    pub(crate) fn not_found() -> Self {
        Self::unverified(None, "not found")
    }

    pub(crate) fn pending_in_queue() -> Self {
        Self::unverified(None, "pending in batch queue")
    }

    pub(crate) fn unverified(anchor_id: Option<String>, error: &str) -> Self {
        VerificationResult {
            verified: false,
            anchor_id,
            merkle_root: None,
            public_chain_tx_hash: None,
            anchored_at: None,
            error: Some(error.to_string()),
        }
    }
}

/// A self-contained inclusion proof for one transaction in one anchor.
///
/// Carries everything an external auditor needs to recompute the root from
/// the leaf without trusting the store's own `verified` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// The anchor the proof was generated against.
    pub anchor_id: String,
    /// The transaction being proven.
    pub transaction_id: String,
    /// Leaf hash of the transaction.
    #[serde(with = "hex_hash")]
    pub leaf_hash: [u8; 32],
    /// Expected Merkle root (the anchored value).
    #[serde(with = "hex_hash")]
    pub merkle_root: [u8; 32],
    /// Sibling hashes from leaf to root.
    pub steps: Vec<ProofStep>,
}

impl InclusionProof {
    /// Recomputes the root from the leaf and compares it to the anchored
    /// root. Requires no store or engine access.
    pub fn verify(&self) -> bool {
        MerkleTree::verify_proof(&self.leaf_hash, &self.steps, &self.merkle_root)
    }
}

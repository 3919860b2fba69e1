// src/core/transaction.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::hash::leaf_hash;
use crate::core::merkle::hex_hash;
use crate::error::Result;

/// One off-chain event queued for anchoring.
///
/// The leaf hash is computed once at construction over a canonical preimage
/// of the event; the record is immutable afterwards and leaves the pending
/// queue exactly once, when its batch is cut.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionHash {
    /// Caller-supplied transaction id, e.g. "pay:20260826:0042"
    pub id: String,
    /// Merkle leaf hash of the canonical event preimage
    #[serde(with = "hex_hash")]
    pub hash: [u8; 32],
    /// When the event was queued for anchoring
    pub timestamp: DateTime<Utc>,
    /// Event category, e.g. "payment", "settlement", "audit"
    pub tx_type: String,
    /// Event payload as supplied by the producer
    pub metadata: serde_json::Value,
}

impl TransactionHash {
    /// Creates a new `TransactionHash`, computing the leaf hash over
    /// `id ∥ tx_type ∥ timestamp ∥ metadata`.
    ///
    /// The metadata is serialized with `serde_json::to_vec` and validated by
    /// parsing it back, which catches malformed numbers that `to_vec` may
    /// let through.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be serialized to valid JSON.
    pub fn new(
        id: String,
        tx_type: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<Self> {
        let payload_bytes = serde_json::to_vec(&metadata)?;
        serde_json::from_slice::<serde_json::Value>(&payload_bytes)?;

        let mut preimage = Vec::with_capacity(id.len() + tx_type.len() + payload_bytes.len() + 32);
        preimage.extend_from_slice(id.as_bytes());
        preimage.extend_from_slice(tx_type.as_bytes());
        preimage.extend_from_slice(timestamp.to_rfc3339().as_bytes());
        preimage.extend_from_slice(&payload_bytes);
        let hash = leaf_hash(&preimage);

        Ok(TransactionHash {
            id,
            hash,
            timestamp,
            tx_type,
            metadata,
        })
    }

    /// The leaf hash rendered as lowercase hex.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

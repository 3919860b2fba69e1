// src/core/anchor.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::merkle::hex_hash;
use crate::error::{AnchorError, Result};

/// Lifecycle state of an anchor record.
///
/// Transitions are monotonic: `Pending → Anchoring → {Confirmed | Failed}`,
/// and `Failed → Anchoring` only through an explicit operator retry.
/// `Confirmed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    /// Batch composed but submission not yet started
    Pending,
    /// Submission to the public chain is in progress
    Anchoring,
    /// Root committed to the public chain
    Confirmed,
    /// All submission attempts exhausted; awaiting explicit retry
    Failed,
}

impl AnchorStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: AnchorStatus) -> bool {
        use AnchorStatus::*;
        matches!(
            (self, next),
            (Pending, Anchoring) | (Anchoring, Confirmed) | (Anchoring, Failed) | (Failed, Anchoring)
        )
    }

    /// Lowercase wire name, as used in verification results.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Anchoring => "anchoring",
            AnchorStatus::Confirmed => "confirmed",
            AnchorStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anchoring batch: a Merkle root over an ordered set of transaction
/// hashes plus the submission bookkeeping for it.
///
/// Records are append-only; they are never deleted and form the audit trail.
/// The ordered `leaf_hashes` list is frozen at cut time so the exact tree can
/// be rebuilt later for inclusion proofs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnchorRecord {
    /// Unique anchor id (UUID v4)
    pub id: String,
    /// Merkle root over `leaf_hashes`, in order
    #[serde(with = "hex_hash")]
    pub merkle_root: [u8; 32],
    /// Number of transactions in the batch; equals `transaction_ids.len()`
    pub transaction_count: usize,
    /// Transaction ids in leaf order
    pub transaction_ids: Vec<String>,
    /// Ordered leaf hashes frozen at cut time
    #[serde(with = "hex_hash_vec")]
    pub leaf_hashes: Vec<[u8; 32]>,
    /// Timestamp of the oldest transaction in the batch
    pub batch_start_time: DateTime<Utc>,
    /// Timestamp of the newest transaction in the batch
    pub batch_end_time: DateTime<Utc>,
    /// When the root was confirmed on the public chain
    pub anchored_at: Option<DateTime<Utc>>,
    /// Transaction hash returned by the public chain on success
    pub public_chain_tx_hash: Option<String>,
    /// Current lifecycle state
    pub status: AnchorStatus,
    /// Failed submission attempts in the current anchoring round
    pub retry_count: u32,
    /// Last submission error, if any
    pub error: Option<String>,
}

impl AnchorRecord {
    /// Creates a record for a freshly cut batch, in `Anchoring` state.
    ///
    /// The transaction id list and leaf hash list must be index-aligned;
    /// their shared order is the leaf order of the tree.
    pub fn new(
        merkle_root: [u8; 32],
        transaction_ids: Vec<String>,
        leaf_hashes: Vec<[u8; 32]>,
        batch_start_time: DateTime<Utc>,
        batch_end_time: DateTime<Utc>,
    ) -> Self {
        debug_assert_eq!(transaction_ids.len(), leaf_hashes.len());
        AnchorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            merkle_root,
            transaction_count: transaction_ids.len(),
            transaction_ids,
            leaf_hashes,
            batch_start_time,
            batch_end_time,
            anchored_at: None,
            public_chain_tx_hash: None,
            status: AnchorStatus::Anchoring,
            retry_count: 0,
            error: None,
        }
    }

    /// Moves the record to `status`, enforcing monotonic transitions.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::NotAllowed`] for an illegal transition, e.g.
    /// out of `Confirmed` or into `Anchoring` without an explicit retry.
    pub fn transition_to(&mut self, status: AnchorStatus) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(AnchorError::not_allowed(format!(
                "anchor {}: illegal status transition {} -> {}",
                self.id, self.status, status
            )));
        }
        self.status = status;
        Ok(())
    }

    /// Marks the record confirmed with the chain receipt.
    pub fn confirm(&mut self, public_chain_tx_hash: String, anchored_at: DateTime<Utc>) -> Result<()> {
        self.transition_to(AnchorStatus::Confirmed)?;
        self.public_chain_tx_hash = Some(public_chain_tx_hash);
        self.anchored_at = Some(anchored_at);
        self.error = None;
        Ok(())
    }

    /// Marks the record failed with the terminal error message.
    pub fn fail(&mut self, error: String) -> Result<()> {
        self.transition_to(AnchorStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Index of `tx_id` within the batch's leaf order, if present.
    pub fn leaf_index_of(&self, tx_id: &str) -> Option<usize> {
        self.transaction_ids.iter().position(|id| id == tx_id)
    }

    /// The Merkle root rendered as lowercase hex.
    pub fn merkle_root_hex(&self) -> String {
        hex::encode(self.merkle_root)
    }
}

/// Serde adapter rendering a list of 32-byte hashes as lowercase hex strings.
mod hex_hash_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(hashes: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(hashes.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| {
                hex::decode(&s)
                    .map_err(serde::de::Error::custom)?
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected a 32-byte hex hash"))
            })
            .collect()
    }
}

// src/store/mod.rs

// Define sub-modules for store backends
pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::anchor::AnchorRecord;
use crate::error::Result;

pub use file::FileAnchorStore;
pub use memory::MemoryAnchorStore;

/// Read-only aggregate view over an anchor store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AnchorStatistics {
    /// Total anchor records ever created.
    pub total_anchors: usize,
    /// Records currently confirmed.
    pub confirmed: usize,
    /// Records currently failed.
    pub failed: usize,
    /// Records mid-submission.
    pub anchoring: usize,
    /// Transactions covered by confirmed anchors.
    pub transactions_anchored: usize,
    /// Most recent confirmation time, if any.
    pub last_anchored_at: Option<DateTime<Utc>>,
}

/// Durable (or in-memory) home of anchor records and the
/// transaction-id → anchor-id index.
///
/// The store exclusively owns records after a cut; records are append-only
/// and never deleted. `insert_record` writes the record before the index so a
/// reader that finds an index entry always finds a fully populated record.
/// `update_record` replaces the record wholesale; readers never observe a
/// half-written state.
#[async_trait]
pub trait AnchorStore: Send + Sync + std::fmt::Debug {
    /// Inserts a new record and indexes every included transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AnchorError::Storage`] if the record id already
    /// exists or any transaction id is already mapped to another anchor.
    async fn insert_record(&self, record: AnchorRecord) -> Result<()>;

    /// Replaces an existing record (status/receipt updates after submission).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AnchorError::NotFound`] if no record with this
    /// id exists.
    async fn update_record(&self, record: &AnchorRecord) -> Result<()>;

    /// Loads a record by anchor id.
    async fn get_record(&self, anchor_id: &str) -> Result<Option<AnchorRecord>>;

    /// Looks up the anchor id a transaction is mapped to, if any.
    async fn anchor_for_transaction(&self, tx_id: &str) -> Result<Option<String>>;

    /// The most recent records, newest batch first, up to `limit`.
    async fn recent_records(&self, limit: usize) -> Result<Vec<AnchorRecord>>;

    /// Total number of records.
    async fn record_count(&self) -> Result<usize>;

    /// Aggregates statistics over all records. O(number of anchors), which is
    /// batch-level volume, not per-transaction.
    async fn statistics(&self) -> Result<AnchorStatistics>;
}

pub(crate) fn compute_statistics<'a, I>(records: I) -> AnchorStatistics
where
    I: Iterator<Item = &'a AnchorRecord>,
{
    use crate::core::anchor::AnchorStatus;

    let mut stats = AnchorStatistics::default();
    for record in records {
        stats.total_anchors += 1;
        match record.status {
            AnchorStatus::Confirmed => {
                stats.confirmed += 1;
                stats.transactions_anchored += record.transaction_count;
                if record.anchored_at > stats.last_anchored_at {
                    stats.last_anchored_at = record.anchored_at;
                }
            }
            AnchorStatus::Failed => stats.failed += 1,
            AnchorStatus::Anchoring | AnchorStatus::Pending => stats.anchoring += 1,
        }
    }
    stats
}

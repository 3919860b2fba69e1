// src/engine.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::core::anchor::{AnchorRecord, AnchorStatus};
use crate::core::merkle::MerkleTree;
use crate::core::transaction::TransactionHash;
use crate::error::{AnchorError, Result};
use crate::queue::BatchQueue;
use crate::store::{AnchorStatistics, AnchorStore};
use crate::verification::{InclusionProof, VerificationResult};

/// Receipt returned to a producer when its transaction is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReceipt {
    /// The transaction's leaf hash, lowercase hex.
    pub hash: String,
    /// 0-based position in the pending queue at enqueue time.
    pub queue_position: usize,
}

/// Engine-level statistics: store aggregates plus live queue depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Aggregates over all anchor records.
    pub anchors: AnchorStatistics,
    /// Transactions queued but not yet cut into a batch.
    pub pending_in_queue: usize,
}

/// The transaction-anchoring engine.
///
/// Producers feed event hashes in through [`add_transaction`]; a scheduler
/// (or a size trigger) cuts batches into Merkle trees whose roots are
/// submitted to the public chain through the injected [`ChainClient`]; the
/// verification surface answers status and proof queries against the
/// injected [`AnchorStore`]. All dependencies are explicit; there is no
/// process-wide state.
///
/// [`add_transaction`]: AnchorEngine::add_transaction
#[derive(Debug)]
pub struct AnchorEngine {
    config: Arc<Config>,
    queue: BatchQueue,
    store: Arc<dyn AnchorStore>,
    chain: Arc<dyn ChainClient>,
    clock: Arc<dyn Clock>,
    /// Single-flight guard: one batch cut (or explicit retry) in progress at
    /// a time, process-wide.
    cut_lock: tokio::sync::Mutex<()>,
    /// Ids drained from the queue whose anchor record is not yet in the
    /// store. Populated atomically with the drain, so every transaction is
    /// visible in the queue, here, or the index at all times.
    in_cut: Mutex<HashSet<String>>,
}

impl AnchorEngine {
    /// Creates an engine with the given dependencies.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn AnchorStore>,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AnchorEngine {
            config,
            queue: BatchQueue::new(),
            store,
            chain,
            clock,
            cut_lock: tokio::sync::Mutex::new(()),
            in_cut: Mutex::new(HashSet::new()),
        }
    }

    /// Creates an engine on the system wall clock.
    pub fn with_system_clock(
        config: Arc<Config>,
        store: Arc<dyn AnchorStore>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self::new(config, store, chain, Arc::new(SystemClock))
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transactions queued but not yet cut.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Hashes an off-chain event and appends it to the pending queue.
    ///
    /// Arrival order is preserved; it becomes the Merkle leaf order at cut
    /// time. If the append fills the queue to `batch.max_batch_size`, a cut
    /// is triggered immediately without waiting for the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::AlreadyAnchored`] if the id is already queued
    /// or already mapped to an anchor, or [`AnchorError::InvalidInput`] for
    /// an empty id.
    pub async fn add_transaction(
        &self,
        id: &str,
        tx_type: &str,
        metadata: serde_json::Value,
    ) -> Result<AddReceipt> {
        if id.is_empty() {
            return Err(AnchorError::invalid_input("transaction id must not be empty"));
        }
        if self.store.anchor_for_transaction(id).await?.is_some() {
            return Err(AnchorError::AlreadyAnchored(id.to_string()));
        }
        if self.is_in_cut(id) {
            return Err(AnchorError::AlreadyAnchored(id.to_string()));
        }

        let tx = TransactionHash::new(
            id.to_string(),
            tx_type.to_string(),
            self.clock.now(),
            metadata,
        )?;
        let hash = tx.hash_hex();
        let queue_position = self.queue.push(tx)?;
        debug!("queued transaction {} at position {}", id, queue_position);

        if queue_position + 1 >= self.config.batch.max_batch_size {
            info!(
                "queue reached max batch size {}, cutting immediately",
                self.config.batch.max_batch_size
            );
            self.cut_batch().await?;
        }

        Ok(AddReceipt {
            hash,
            queue_position,
        })
    }

    /// Cuts a batch if the queue has reached `batch.min_batch_size`.
    ///
    /// This is the scheduler's tick entry point.
    pub async fn cut_if_ready(&self) -> Result<Option<AnchorRecord>> {
        if self.queue.len() < self.config.batch.min_batch_size {
            return Ok(None);
        }
        self.cut_batch().await
    }

    /// Cuts a batch now regardless of `batch.min_batch_size`.
    ///
    /// Returns `None` when the queue is empty. Operational entry point.
    pub async fn force_batch_process(&self) -> Result<Option<AnchorRecord>> {
        self.cut_batch().await
    }

    /// Cuts up to `batch.max_batch_size` oldest pending transactions into one
    /// anchor: builds the tree, records the batch as `anchoring`, indexes
    /// every transaction id, then submits the root with bounded retries.
    ///
    /// The whole sequence runs under the single-flight cut lock, so two cuts
    /// can never race over the same queue contents and verification lookups
    /// observe the record from the moment the batch exists.
    async fn cut_batch(&self) -> Result<Option<AnchorRecord>> {
        let _guard = self.cut_lock.lock().await;

        // Drain and mark in-cut under one lock: a lookup that misses the
        // queue either blocks here until the ids are marked or sees them
        // marked already.
        let batch = {
            let mut in_cut = self.in_cut.lock().expect("in-cut mutex poisoned");
            let batch = self.queue.drain_oldest(self.config.batch.max_batch_size);
            in_cut.extend(batch.iter().map(|tx| tx.id.clone()));
            batch
        };
        if batch.is_empty() {
            return Ok(None);
        }

        let leaf_hashes: Vec<[u8; 32]> = batch.iter().map(|tx| tx.hash).collect();
        let transaction_ids: Vec<String> = batch.iter().map(|tx| tx.id.clone()).collect();
        let batch_start_time = batch
            .iter()
            .map(|tx| tx.timestamp)
            .min()
            .unwrap_or_else(|| self.clock.now());
        let batch_end_time = batch
            .iter()
            .map(|tx| tx.timestamp)
            .max()
            .unwrap_or_else(|| self.clock.now());

        let tree = MerkleTree::build(leaf_hashes.clone())?;
        let mut record = AnchorRecord::new(
            tree.root(),
            transaction_ids,
            leaf_hashes,
            batch_start_time,
            batch_end_time,
        );
        info!(
            "cut batch {}: {} transactions, root {}",
            record.id,
            record.transaction_count,
            record.merkle_root_hex()
        );

        // Record and index become visible before the first submission
        // attempt; a lookup from here on answers "anchoring", not "not found".
        // If the insert fails, the batch goes back to the front of the queue
        // intact so a later cut can anchor it.
        if let Err(e) = self.store.insert_record(record.clone()).await {
            warn!(
                "cut {}: store insert failed, returning {} transactions to the queue: {}",
                record.id, record.transaction_count, e
            );
            self.queue.restore_front(batch);
            self.clear_in_cut(&record.transaction_ids);
            return Err(e);
        }
        self.clear_in_cut(&record.transaction_ids);
        self.submit_with_retries(&mut record).await?;
        Ok(Some(record))
    }

    fn is_in_cut(&self, tx_id: &str) -> bool {
        self.in_cut
            .lock()
            .expect("in-cut mutex poisoned")
            .contains(tx_id)
    }

    fn clear_in_cut(&self, tx_ids: &[String]) {
        let mut in_cut = self.in_cut.lock().expect("in-cut mutex poisoned");
        for tx_id in tx_ids {
            in_cut.remove(tx_id);
        }
    }

    /// Reattempts submission of a failed anchor's stored root.
    ///
    /// The tree is never rebuilt; the same root is resubmitted. Calling this
    /// on a `confirmed` record is a no-op. Serialized with batch cuts on the
    /// cut lock.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::NotFound`] for an unknown anchor id and
    /// [`AnchorError::NotAllowed`] if the record is mid-submission.
    pub async fn retry_failed_anchor(&self, anchor_id: &str) -> Result<AnchorRecord> {
        let _guard = self.cut_lock.lock().await;

        let mut record = self
            .store
            .get_record(anchor_id)
            .await?
            .ok_or_else(|| AnchorError::not_found(format!("anchor {}", anchor_id)))?;

        match record.status {
            AnchorStatus::Confirmed => {
                debug!("retry requested for confirmed anchor {}, ignoring", anchor_id);
                Ok(record)
            }
            AnchorStatus::Failed => {
                record.transition_to(AnchorStatus::Anchoring)?;
                record.retry_count = 0;
                record.error = None;
                self.store.update_record(&record).await?;
                info!("retrying failed anchor {}", anchor_id);
                self.submit_with_retries(&mut record).await?;
                Ok(record)
            }
            AnchorStatus::Pending | AnchorStatus::Anchoring => Err(AnchorError::not_allowed(
                format!("anchor {} is currently {}", anchor_id, record.status),
            )),
        }
    }

    /// Runs one anchoring round: up to `submission.max_attempts` submissions
    /// of the record's root with a fixed delay in between, each attempt
    /// bounded by `submission.submit_timeout` so a hung chain client cannot
    /// stall batch formation indefinitely.
    ///
    /// The outcome lands in the record (`confirmed` or `failed`), never in
    /// the returned `Result`; only store failures propagate.
    async fn submit_with_retries(&self, record: &mut AnchorRecord) -> Result<()> {
        let max_attempts = self.config.submission.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(
                self.config.submission.submit_timeout(),
                self.chain.submit(&record.merkle_root),
            )
            .await;

            match outcome {
                Ok(Ok(receipt)) => {
                    record.confirm(receipt.tx_hash, self.clock.now())?;
                    self.store.update_record(record).await?;
                    info!(
                        "anchor {} confirmed on chain as {} after {} failed attempts",
                        record.id,
                        record.public_chain_tx_hash.as_deref().unwrap_or_default(),
                        record.retry_count
                    );
                    return Ok(());
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error = format!(
                        "submission timed out after {}s",
                        self.config.submission.submit_timeout_seconds
                    );
                }
            }

            record.retry_count += 1;
            warn!(
                "anchor {}: submission attempt {}/{} failed: {}",
                record.id, attempt, max_attempts, last_error
            );
            if attempt < max_attempts {
                tokio::time::sleep(self.config.submission.retry_delay()).await;
            }
        }

        record.fail(last_error)?;
        self.store.update_record(record).await?;
        warn!(
            "anchor {} failed after {} attempts; awaiting explicit retry",
            record.id, max_attempts
        );
        Ok(())
    }

    /// Reports the anchoring status of a transaction.
    ///
    /// Total over all inputs: unknown ids, queued-but-uncut transactions and
    /// unconfirmed anchors all come back as `verified = false` with a
    /// descriptive `error`, never as an `Err`.
    pub async fn verify_transaction(&self, tx_id: &str) -> Result<VerificationResult> {
        if let Some(result) = self.verify_indexed(tx_id).await? {
            return Ok(result);
        }
        if self.queue.contains(tx_id) {
            return Ok(VerificationResult::pending_in_queue());
        }
        if self.is_in_cut(tx_id) {
            return Ok(VerificationResult::unverified(
                None,
                AnchorStatus::Anchoring.as_str(),
            ));
        }
        // A cut may have moved the transaction from the queue into the store
        // between the checks above; consult the index once more before
        // concluding the id is unknown.
        if let Some(result) = self.verify_indexed(tx_id).await? {
            return Ok(result);
        }
        Ok(VerificationResult::not_found())
    }

    async fn verify_indexed(&self, tx_id: &str) -> Result<Option<VerificationResult>> {
        let Some(anchor_id) = self.store.anchor_for_transaction(tx_id).await? else {
            return Ok(None);
        };
        let record = self
            .store
            .get_record(&anchor_id)
            .await?
            .ok_or_else(|| AnchorError::storage(format!(
                "index maps {} to missing anchor {}",
                tx_id, anchor_id
            )))?;

        if record.status == AnchorStatus::Confirmed {
            return Ok(Some(VerificationResult {
                verified: true,
                anchor_id: Some(record.id.clone()),
                merkle_root: Some(record.merkle_root_hex()),
                public_chain_tx_hash: record.public_chain_tx_hash.clone(),
                anchored_at: record.anchored_at,
                error: None,
            }));
        }
        Ok(Some(VerificationResult::unverified(
            Some(record.id.clone()),
            record.status.as_str(),
        )))
    }

    /// Builds an inclusion proof for `tx_id` within `anchor_id` from the
    /// anchor's stored, ordered leaf list.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::NotFound`] for an unknown anchor or a
    /// transaction that is not part of that anchor.
    pub async fn get_inclusion_proof(
        &self,
        anchor_id: &str,
        tx_id: &str,
    ) -> Result<InclusionProof> {
        let record = self
            .store
            .get_record(anchor_id)
            .await?
            .ok_or_else(|| AnchorError::not_found(format!("anchor {}", anchor_id)))?;
        let index = record.leaf_index_of(tx_id).ok_or_else(|| {
            AnchorError::not_found(format!(
                "transaction {} in anchor {}",
                tx_id, anchor_id
            ))
        })?;

        let tree = MerkleTree::build(record.leaf_hashes.clone())?;
        let steps = tree.proof(index)?;
        Ok(InclusionProof {
            anchor_id: record.id,
            transaction_id: tx_id.to_string(),
            leaf_hash: record.leaf_hashes[index],
            merkle_root: record.merkle_root,
            steps,
        })
    }

    /// Loads one anchor record by id.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::NotFound`] for an unknown anchor id.
    pub async fn get_anchor_status(&self, anchor_id: &str) -> Result<AnchorRecord> {
        self.store
            .get_record(anchor_id)
            .await?
            .ok_or_else(|| AnchorError::not_found(format!("anchor {}", anchor_id)))
    }

    /// The most recent anchors, newest first, up to `limit`.
    pub async fn get_recent_anchors(&self, limit: usize) -> Result<Vec<AnchorRecord>> {
        self.store.recent_records(limit).await
    }

    /// Store aggregates plus the live pending-queue depth.
    pub async fn get_statistics(&self) -> Result<EngineStatistics> {
        Ok(EngineStatistics {
            anchors: self.store.statistics().await?,
            pending_in_queue: self.queue.len(),
        })
    }
}

// src/queue.rs

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::transaction::TransactionHash;
use crate::error::{AnchorError, Result};

/// Ordered, thread-safe accumulation of pending transaction hashes.
///
/// Arrival order is preserved end to end: it fixes the Merkle leaf order at
/// cut time and therefore the reproducibility of the root. The queue
/// exclusively owns entries until a cut drains them; each entry leaves
/// exactly once.
#[derive(Debug, Default)]
pub struct BatchQueue {
    pending: Mutex<VecDeque<TransactionHash>>,
}

impl BatchQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a transaction to the tail and returns its 0-based queue
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::AlreadyAnchored`] if the id is already queued;
    /// a transaction must never be able to end up under two roots.
    pub fn push(&self, tx: TransactionHash) -> Result<usize> {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        if pending.iter().any(|entry| entry.id == tx.id) {
            return Err(AnchorError::AlreadyAnchored(tx.id));
        }
        pending.push_back(tx);
        Ok(pending.len() - 1)
    }

    /// Removes and returns up to `max` entries from the front, oldest first.
    pub fn drain_oldest(&self, max: usize) -> Vec<TransactionHash> {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        let take = max.min(pending.len());
        pending.drain(..take).collect()
    }

    /// Returns previously drained entries to the front of the queue, keeping
    /// their original relative order. Used when a cut cannot be recorded and
    /// the batch must stay eligible for a later cut.
    pub fn restore_front(&self, batch: Vec<TransactionHash>) {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        for tx in batch.into_iter().rev() {
            pending.push_front(tx);
        }
    }

    /// Whether a transaction with `id` is currently queued.
    pub fn contains(&self, id: &str) -> bool {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .iter()
            .any(|entry| entry.id == id)
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.pending.lock().expect("queue mutex poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// src/chain/mod.rs

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::hash::sha256_hash_concat;
use crate::error::{AnchorError, Result};

/// Receipt returned by the public chain for an accepted root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Transaction hash on the public chain.
    pub tx_hash: String,
}

/// Abstraction over the external public ledger.
///
/// Implementations submit a Merkle root and return the chain transaction hash
/// once accepted. Submitting the same root twice must be benign from the
/// engine's perspective; the engine resubmits an identical root on retry and
/// never rebuilds a batch. The concrete ledger integration lives outside this
/// crate.
#[async_trait]
pub trait ChainClient: Send + Sync + std::fmt::Debug {
    /// Submits a Merkle root to the public chain.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::Submission`] for transient failures the engine
    /// may retry.
    async fn submit(&self, merkle_root: &[u8; 32]) -> Result<SubmitReceipt>;
}

/// A stand-in chain client for demos and tests.
///
/// Derives a deterministic pseudo chain-tx hash from the submitted root and
/// a per-instance nonce. Failures and latency are scriptable, mirroring the
/// failure-injection hooks on the in-memory store: `fail_next(n)` makes the
/// next `n` submissions return a transient error.
#[derive(Debug, Default)]
pub struct SimulatedChainClient {
    submissions: AtomicU64,
    fail_remaining: AtomicU32,
    latency_ms: AtomicU64,
}

impl SimulatedChainClient {
    /// Creates a client that accepts every submission instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` submissions fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Adds a fixed artificial latency to every submission.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Total submissions attempted against this client.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for SimulatedChainClient {
    async fn submit(&self, merkle_root: &[u8; 32]) -> Result<SubmitReceipt> {
        let nonce = self.submissions.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(AnchorError::submission(
                "simulated chain rejection: node unavailable",
            ));
        }

        let digest = sha256_hash_concat(&[merkle_root, &nonce.to_be_bytes()]);
        Ok(SubmitReceipt {
            tx_hash: format!("0x{}", hex::encode(digest)),
        })
    }
}

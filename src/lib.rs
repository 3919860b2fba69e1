// src/lib.rs

//! Transaction anchoring engine.
//!
//! Batches hashes of off-chain events (payments, settlements, audit entries)
//! into Merkle trees and commits each root to an external public ledger, so
//! any record can later be proven to have existed, unmodified, at a point in
//! time. Producers feed events in through [`AnchorEngine::add_transaction`];
//! batches are cut by size or by the [`AnchorScheduler`] timer; compliance
//! and external auditors query [`AnchorEngine::verify_transaction`] and
//! [`AnchorEngine::get_inclusion_proof`].

pub mod chain;
pub mod clock;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod verification;

pub use crate::chain::{ChainClient, SimulatedChainClient, SubmitReceipt};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::Config;
pub use crate::core::{AnchorRecord, AnchorStatus, MerkleTree, ProofStep, Side, TransactionHash};
pub use crate::engine::{AddReceipt, AnchorEngine, EngineStatistics};
pub use crate::error::{AnchorError, Result};
pub use crate::scheduler::AnchorScheduler;
pub use crate::store::{AnchorStatistics, AnchorStore, FileAnchorStore, MemoryAnchorStore};
pub use crate::verification::{InclusionProof, VerificationResult};

/// Initializes `env_logger` from the logging configuration.
///
/// Safe to call more than once; only the first call takes effect.
#[cfg(feature = "logging")]
pub fn init_logger(config: &config::LoggingConfig) {
    let level = if config.console {
        config.level.into()
    } else {
        log::LevelFilter::Off
    };
    let _ = env_logger::Builder::new().filter_level(level).try_init();
}

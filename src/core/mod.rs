// src/core/mod.rs

/// Utility functions and domain tags for cryptographic hashing (SHA256).
pub mod hash;
/// Implements Merkle tree construction, root calculation, and proof generation/verification.
pub mod merkle;
/// Defines the `TransactionHash` structure, one queued off-chain event.
pub mod transaction;
/// Defines the `AnchorRecord` structure and its status state machine.
pub mod anchor;

pub use anchor::{AnchorRecord, AnchorStatus};
pub use merkle::{MerkleTree, ProofStep, Side};
pub use transaction::TransactionHash;

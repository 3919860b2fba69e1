// src/core/hash.rs

use sha2::{Digest, Sha256};

/// Domain tag prefixed to leaf preimages.
pub const LEAF_TAG: u8 = 0x00;
/// Domain tag prefixed to internal-node preimages.
pub const NODE_TAG: u8 = 0x01;
/// Domain tag hashed to produce the padding node for odd-sized levels.
pub const PAD_TAG: u8 = 0x02;

/// Computes the SHA256 hash of the given data.
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the SHA256 hash of a list of byte slices concatenated together.
pub fn sha256_hash_concat(data_slices: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for slice in data_slices {
        hasher.update(slice);
    }
    hasher.finalize().into()
}

/// Hashes a leaf payload, domain-separated from internal nodes.
///
/// Tagging leaves differently from nodes blocks second-preimage attacks that
/// reinterpret an internal node as a leaf (or vice versa).
pub fn leaf_hash(payload: &[u8]) -> [u8; 32] {
    sha256_hash_concat(&[&[LEAF_TAG], payload])
}

/// Hashes a pair of child nodes into their parent. Order-sensitive.
pub fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    sha256_hash_concat(&[&[NODE_TAG], left, right])
}

/// The padding node paired with an odd node at any tree level.
///
/// A fixed, tagged constant rather than a duplicate of the odd node, so the
/// tree shape stays unambiguous.
pub fn padding_node() -> [u8; 32] {
    sha256_hash(&[PAD_TAG])
}

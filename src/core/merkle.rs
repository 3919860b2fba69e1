// src/core/merkle.rs

use serde::{Deserialize, Serialize};

use crate::core::hash::{node_hash, padding_node};
use crate::error::{AnchorError, Result};

/// Which side a proof sibling sits on relative to the node being proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is the left child; the running hash is the right child.
    Left,
    /// Sibling is the right child; the running hash is the left child.
    Right,
}

/// One step of an inclusion proof: a sibling hash and its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling hash at this level.
    #[serde(with = "hex_hash")]
    pub sibling: [u8; 32],
    /// Which side the sibling is on.
    pub side: Side,
}

/// Merkle tree over an ordered leaf list.
///
/// Internal nodes are hashed order-sensitively with a node domain tag; an odd
/// node at any level is paired with a tagged padding node, never with a copy
/// of itself. Every level is retained so proofs can be generated after the
/// fact.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] is the leaf level; the last level holds only the root.
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Builds a tree from an ordered list of leaf hashes.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::Merkle`] for an empty leaf list; an empty batch
    /// has no meaningful root.
    pub fn build(leaves: Vec<[u8; 32]>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AnchorError::Merkle(
                "cannot build a Merkle tree from an empty leaf list".to_string(),
            ));
        }

        let mut levels = Vec::new();
        let mut current = leaves;
        while current.len() > 1 {
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                let hash = if pair.len() == 2 {
                    node_hash(&pair[0], &pair[1])
                } else {
                    node_hash(&pair[0], &padding_node())
                };
                next.push(hash);
            }
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Ok(Self { levels })
    }

    /// The root hash of the tree.
    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves the tree was built from.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// The leaf hash at `index`, if present.
    pub fn leaf(&self, index: usize) -> Option<[u8; 32]> {
        self.levels[0].get(index).copied()
    }

    /// Generates an inclusion proof for the leaf at `index`.
    ///
    /// The proof lists sibling hashes bottom-up; folding them in order with
    /// [`verify_proof`] reproduces the root in O(log n) steps.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError::Merkle`] if `index` is out of range.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return Err(AnchorError::Merkle(format!(
                "leaf index {} out of range for {} leaves",
                index,
                self.leaf_count()
            )));
        }

        let mut steps = Vec::new();
        let mut current_index = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, side) = if current_index % 2 == 0 {
                let sibling = level.get(current_index + 1).copied().unwrap_or_else(padding_node);
                (sibling, Side::Right)
            } else {
                (level[current_index - 1], Side::Left)
            };
            steps.push(ProofStep { sibling, side });
            current_index /= 2;
        }

        Ok(steps)
    }

    /// Verifies an inclusion proof against an expected root.
    ///
    /// Independent of any tree or store instance, so external auditors can
    /// check inclusion from just a leaf hash, the proof, and a published root.
    pub fn verify_proof(leaf_hash: &[u8; 32], proof: &[ProofStep], expected_root: &[u8; 32]) -> bool {
        let mut computed = *leaf_hash;
        for step in proof {
            computed = match step.side {
                Side::Left => node_hash(&step.sibling, &computed),
                Side::Right => node_hash(&computed, &step.sibling),
            };
        }
        computed == *expected_root
    }
}

/// Serde adapter rendering a 32-byte hash as lowercase hex.
pub(crate) mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected a 32-byte hex hash"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::leaf_hash;

    fn test_leaves(n: usize) -> Vec<[u8; 32]> {
        (0..n).map(|i| leaf_hash(format!("leaf-{}", i).as_bytes())).collect()
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = MerkleTree::build(Vec::new()).unwrap_err();
        assert!(matches!(err, AnchorError::Merkle(_)));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let leaves = test_leaves(1);
        let tree = MerkleTree::build(leaves.clone()).unwrap();
        assert_eq!(tree.root(), leaves[0]);
        assert!(tree.proof(0).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic_root() {
        let leaves = test_leaves(7);
        let tree1 = MerkleTree::build(leaves.clone()).unwrap();
        let tree2 = MerkleTree::build(leaves).unwrap();
        assert_eq!(tree1.root(), tree2.root());
    }

    #[test]
    fn test_root_depends_on_order() {
        let mut leaves = test_leaves(4);
        let tree1 = MerkleTree::build(leaves.clone()).unwrap();
        leaves.swap(1, 2);
        let tree2 = MerkleTree::build(leaves).unwrap();
        assert_ne!(tree1.root(), tree2.root());
    }

    #[test]
    fn test_proofs_verify_for_all_leaves() {
        for n in [1usize, 2, 3, 4, 5, 8, 13] {
            let leaves = test_leaves(n);
            let tree = MerkleTree::build(leaves.clone()).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    MerkleTree::verify_proof(leaf, &proof, &tree.root()),
                    "proof failed for leaf {} of {}",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails_verification() {
        let leaves = test_leaves(5);
        let tree = MerkleTree::build(leaves).unwrap();
        let proof = tree.proof(2).unwrap();
        let impostor = leaf_hash(b"not-in-the-tree");
        assert!(!MerkleTree::verify_proof(&impostor, &proof, &tree.root()));
    }

    #[test]
    fn test_tampered_proof_fails_verification() {
        let leaves = test_leaves(6);
        let tree = MerkleTree::build(leaves.clone()).unwrap();
        let mut proof = tree.proof(3).unwrap();
        proof[0].sibling[0] ^= 0xff;
        assert!(!MerkleTree::verify_proof(&leaves[3], &proof, &tree.root()));
    }

    #[test]
    fn test_odd_leaf_not_self_paired() {
        // With duplicate-last-leaf padding, [a, b, b] and [a, b] can collide.
        // Tagged padding keeps the shapes distinct.
        let mut leaves = test_leaves(2);
        let tree_two = MerkleTree::build(leaves.clone()).unwrap();
        leaves.push(leaves[1]);
        let tree_three = MerkleTree::build(leaves).unwrap();
        assert_ne!(tree_two.root(), tree_three.root());
    }

    #[test]
    fn test_proof_length_is_logarithmic() {
        let leaves = test_leaves(8);
        let tree = MerkleTree::build(leaves).unwrap();
        assert_eq!(tree.proof(0).unwrap().len(), 3);
    }

    #[test]
    fn test_proof_index_out_of_range() {
        let tree = MerkleTree::build(test_leaves(3)).unwrap();
        assert!(tree.proof(3).is_err());
    }
}

//! Daily Merkle tree construction and inclusion-path generation
//!
//! Nodes are combined as `SHA256(left_hex || right_hex)`: the concatenation
//! of the two lowercase hex strings, not of the raw digest bytes. An odd node
//! at the end of a level is paired with itself.

use sha2::{Digest as Sha2Digest, Sha256};
use tel_types::{Digest, InclusionProof, Position, ProofStep, WindowKey};

use crate::error::{CoreError, Result};

/// Hash a pair of nodes: SHA256(hex(left) || hex(right))
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left.to_hex().as_bytes());
    hasher.update(right.to_hex().as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Digest::new(out)
}

/// A Merkle tree over one window's ordered leaf digests
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] is the leaves, the last level holds only the root
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over `leaves` in the given order; `None` when there are none
    pub fn from_leaves(leaves: Vec<Digest>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = vec![leaves];

        // Build up the tree level by level
        while let Some(prev_level) = levels.last() {
            if prev_level.len() <= 1 {
                break;
            }
            let next_level: Vec<Digest> = prev_level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // Odd number of nodes - pair the last one with itself
                    [last] => hash_pair(last, last),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next_level);
        }

        Some(Self { levels })
    }

    /// Get the root hash
    pub fn root(&self) -> &Digest {
        // levels is non-empty and its last level has exactly one node
        &self.levels[self.levels.len() - 1][0]
    }

    /// Get the number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    /// Number of folding rounds from leaf to root
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Generate the sibling path for a specific leaf
    pub fn generate_path(&self, leaf_index: usize) -> Result<Vec<ProofStep>> {
        if leaf_index >= self.leaf_count() {
            return Err(CoreError::Index {
                index: leaf_index,
                len: self.leaf_count(),
            });
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut index = leaf_index;

        // Walk up the tree from leaf to root
        for level in &self.levels[..self.depth()] {
            let (sibling_index, position) = if index % 2 == 1 {
                (index - 1, Position::Right)
            } else {
                // An unmatched last node is its own sibling
                ((index + 1).min(level.len() - 1), Position::Left)
            };

            path.push(ProofStep {
                sibling_hash: level[sibling_index],
                position,
            });

            index /= 2;
        }

        Ok(path)
    }

    /// Assemble the full proof for a leaf of the window `window_key`
    pub fn inclusion_proof(&self, window_key: WindowKey, leaf_index: usize) -> Result<InclusionProof> {
        let sibling_path = self.generate_path(leaf_index)?;
        Ok(InclusionProof {
            window_key,
            root_hash: *self.root(),
            leaf_hash: self.levels[0][leaf_index],
            leaf_index: leaf_index as u64,
            sibling_path,
        })
    }
}

/// Builder for accumulating a window's leaves in order
#[derive(Debug, Default)]
pub struct MerkleTreeBuilder {
    leaves: Vec<Digest>,
}

impl MerkleTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            leaves: Vec::with_capacity(capacity),
        }
    }

    /// Add a leaf to the tree
    pub fn add_leaf(&mut self, leaf: Digest) {
        self.leaves.push(leaf);
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn build(self) -> Option<MerkleTree> {
        MerkleTree::from_leaves(self.leaves)
    }
}

/// Root over an ordered leaf list; `None` for an empty list
pub fn build_root(leaves: &[Digest]) -> Option<Digest> {
    MerkleTree::from_leaves(leaves.to_vec()).map(|tree| *tree.root())
}

/// Sibling path proving `leaves[target_index]` is under `build_root(leaves)`
pub fn build_proof(leaves: &[Digest], target_index: usize) -> Result<Vec<ProofStep>> {
    match MerkleTree::from_leaves(leaves.to_vec()) {
        Some(tree) => tree.generate_path(target_index),
        None => Err(CoreError::Index {
            index: target_index,
            len: 0,
        }),
    }
}

/// Complete inclusion proof for `leaves[target_index]` in window `window_key`
pub fn inclusion_proof(
    window_key: WindowKey,
    leaves: &[Digest],
    target_index: usize,
) -> Result<InclusionProof> {
    match MerkleTree::from_leaves(leaves.to_vec()) {
        Some(tree) => tree.inclusion_proof(window_key, target_index),
        None => Err(CoreError::Index {
            index: target_index,
            len: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify;
    use proptest::prelude::*;

    fn sha256_hex(s: &str) -> String {
        hex::encode(Sha256::digest(s.as_bytes()))
    }

    fn leaf(c: char) -> Digest {
        Digest::from_hex(&c.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn test_hash_pair_concatenates_hex() {
        let a = leaf('a');
        let b = leaf('b');
        let expected = sha256_hex(&format!("{}{}", "a".repeat(64), "b".repeat(64)));
        assert_eq!(hash_pair(&a, &b).to_hex(), expected);
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_empty_tree() {
        assert!(build_root(&[]).is_none());
        assert!(MerkleTreeBuilder::new().build().is_none());
        assert_eq!(build_proof(&[], 0), Err(CoreError::Index { index: 0, len: 0 }));
    }

    #[test]
    fn test_single_leaf_tree() {
        let only = leaf('7');
        assert_eq!(build_root(&[only]), Some(only));
        assert!(build_proof(&[only], 0).unwrap().is_empty());
    }

    #[test]
    fn test_two_leaf_tree() {
        let leaves = [leaf('1'), leaf('2')];
        let root = build_root(&leaves).unwrap();
        assert_eq!(root, hash_pair(&leaves[0], &leaves[1]));

        let path0 = build_proof(&leaves, 0).unwrap();
        assert_eq!(
            path0,
            vec![ProofStep {
                sibling_hash: leaves[1],
                position: Position::Left,
            }]
        );

        let path1 = build_proof(&leaves, 1).unwrap();
        assert_eq!(path1[0].position, Position::Right);
        assert_eq!(path1[0].sibling_hash, leaves[0]);
    }

    #[test]
    fn test_three_leaf_scenario() {
        let leaves = [leaf('1'), leaf('2'), leaf('3')];
        let (l0, l1, l2) = ("1".repeat(64), "2".repeat(64), "3".repeat(64));

        let expected = sha256_hex(&format!(
            "{}{}",
            sha256_hex(&format!("{}{}", l0, l1)),
            sha256_hex(&format!("{}{}", l2, l2))
        ));
        let root = build_root(&leaves).unwrap();
        assert_eq!(root.to_hex(), expected);

        let path = build_proof(&leaves, 2).unwrap();
        assert_eq!(path.len(), 2);
        // Unmatched last node pairs with itself, then sits on the right
        assert_eq!(path[0].sibling_hash, leaves[2]);
        assert_eq!(path[0].position, Position::Left);
        assert_eq!(path[1].position, Position::Right);

        assert!(verify(&leaves[2], &root, &path));

        let mut flipped = l2.clone();
        flipped.replace_range(0..1, "4");
        let tampered = Digest::from_hex(&flipped).unwrap();
        assert!(!verify(&tampered, &root, &path));
    }

    #[test]
    fn test_out_of_range_index() {
        let leaves = [leaf('1'), leaf('2'), leaf('3')];
        assert_eq!(
            build_proof(&leaves, 3),
            Err(CoreError::Index { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_order_is_committed() {
        let leaves = [leaf('1'), leaf('2'), leaf('3'), leaf('4')];
        let mut swapped = leaves;
        swapped.swap(1, 2);

        assert_eq!(build_root(&leaves), build_root(&leaves));
        assert_ne!(build_root(&leaves), build_root(&swapped));
    }

    #[test]
    fn test_builder_matches_free_functions() {
        let mut builder = MerkleTreeBuilder::with_capacity(5);
        for c in ['a', 'b', 'c', 'd', 'e'] {
            builder.add_leaf(leaf(c));
        }
        assert_eq!(builder.len(), 5);

        let leaves: Vec<Digest> = ['a', 'b', 'c', 'd', 'e'].into_iter().map(leaf).collect();
        let tree = builder.build().unwrap();
        assert_eq!(Some(*tree.root()), build_root(&leaves));
        assert_eq!(tree.depth(), 3);

        let proof = tree
            .inclusion_proof(WindowKey::parse("2024-05-01").unwrap(), 4)
            .unwrap();
        assert_eq!(proof.leaf_hash, leaves[4]);
        assert_eq!(proof.leaf_index, 4);
        assert_eq!(proof.sibling_path, build_proof(&leaves, 4).unwrap());
    }

    prop_compose! {
        fn arb_leaves(max: usize)(
            leaves in prop::collection::vec(prop::array::uniform32(any::<u8>()), 1..max)
        ) -> Vec<Digest> {
            leaves.into_iter().map(Digest::new).collect()
        }
    }

    fn ceil_log2(n: usize) -> usize {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }

    proptest! {
        #[test]
        fn prop_every_leaf_verifies(leaves in arb_leaves(70)) {
            let root = build_root(&leaves).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let path = build_proof(&leaves, i).unwrap();
                prop_assert_eq!(path.len(), ceil_log2(leaves.len()));
                prop_assert!(verify(leaf, &root, &path), "leaf {} failed", i);
            }
        }

        #[test]
        fn prop_index_past_end_fails(leaves in arb_leaves(40), extra in 0usize..5) {
            let index = leaves.len() + extra;
            prop_assert_eq!(
                build_proof(&leaves, index),
                Err(CoreError::Index { index, len: leaves.len() })
            );
        }

        #[test]
        fn prop_root_changes_with_order(leaves in arb_leaves(20), i in any::<prop::sample::Index>(), j in any::<prop::sample::Index>()) {
            let (i, j) = (i.index(leaves.len()), j.index(leaves.len()));
            prop_assume!(leaves[i] != leaves[j]);
            let mut reordered = leaves.clone();
            reordered.swap(i, j);
            prop_assert_ne!(build_root(&leaves), build_root(&reordered));
        }
    }
}

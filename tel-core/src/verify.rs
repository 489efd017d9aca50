//! Inclusion proof verification
//!
//! Verification folds a leaf up its sibling path and needs nothing else:
//! the window's other leaves are never consulted.

use tel_types::{Digest, InclusionProof, Position, ProofStep};
use thiserror::Error;

use crate::merkle::hash_pair;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Merkle path leads to {computed}, expected root {expected}")]
    RootMismatch { expected: Digest, computed: Digest },
}

/// Fold `leaf_hash` up `path` and return the root it leads to
pub fn compute_root(leaf_hash: &Digest, path: &[ProofStep]) -> Digest {
    path.iter().fold(*leaf_hash, |current, step| match step.position {
        Position::Left => hash_pair(&current, &step.sibling_hash),
        Position::Right => hash_pair(&step.sibling_hash, &current),
    })
}

/// Check that `leaf_hash` is committed to by `root_hash` through `path`
pub fn verify(leaf_hash: &Digest, root_hash: &Digest, path: &[ProofStep]) -> bool {
    compute_root(leaf_hash, path) == *root_hash
}

/// Same as [`verify`] for hex inputs in either case. Malformed hex never verifies.
pub fn verify_hex(leaf_hash: &str, root_hash: &str, path: &[ProofStep]) -> bool {
    match (Digest::from_hex(leaf_hash), Digest::from_hex(root_hash)) {
        (Ok(leaf), Ok(root)) => verify(&leaf, &root, path),
        _ => false,
    }
}

/// Verify a complete inclusion proof
pub fn verify_proof(proof: &InclusionProof) -> Result<(), VerificationError> {
    let computed = compute_root(&proof.leaf_hash, &proof.sibling_path);
    if computed != proof.root_hash {
        return Err(VerificationError::RootMismatch {
            expected: proof.root_hash,
            computed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::{build_root, inclusion_proof};
    use proptest::prelude::*;
    use tel_types::WindowKey;

    fn leaf(byte: u8) -> Digest {
        Digest::new([byte; 32])
    }

    #[test]
    fn test_position_fold_order() {
        let (a, b) = (leaf(1), leaf(2));
        let left = ProofStep {
            sibling_hash: b,
            position: Position::Left,
        };
        let right = ProofStep {
            sibling_hash: b,
            position: Position::Right,
        };

        assert_eq!(compute_root(&a, &[left]), hash_pair(&a, &b));
        assert_eq!(compute_root(&a, &[right]), hash_pair(&b, &a));
    }

    #[test]
    fn test_empty_path_is_identity() {
        assert!(verify(&leaf(9), &leaf(9), &[]));
        assert!(!verify(&leaf(9), &leaf(8), &[]));
    }

    #[test]
    fn test_verify_hex_case_insensitive() {
        let leaves = [leaf(0xab), leaf(0xcd), leaf(0xef)];
        let root = build_root(&leaves).unwrap();
        let proof = inclusion_proof(WindowKey::parse("2024-05-01").unwrap(), &leaves, 1).unwrap();

        let upper_root = root.to_hex().to_uppercase();
        let upper_leaf = leaves[1].to_hex().to_uppercase();
        assert!(verify_hex(&upper_leaf, &upper_root, &proof.sibling_path));
        assert!(verify_hex(&leaves[1].to_hex(), &root.to_hex(), &proof.sibling_path));

        assert!(!verify_hex("not-hex", &root.to_hex(), &proof.sibling_path));
        assert!(!verify_hex(&leaves[0].to_hex(), &root.to_hex(), &proof.sibling_path));
    }

    #[test]
    fn test_verify_proof_reports_mismatch() {
        let leaves = [leaf(1), leaf(2), leaf(3), leaf(4)];
        let mut proof = inclusion_proof(WindowKey::parse("2024-05-01").unwrap(), &leaves, 3).unwrap();
        assert!(verify_proof(&proof).is_ok());

        proof.sibling_path[0].position = Position::Left;
        match verify_proof(&proof) {
            Err(VerificationError::RootMismatch { expected, computed }) => {
                assert_eq!(expected, proof.root_hash);
                assert_ne!(computed, expected);
            }
            other => panic!("expected root mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_proof_survives_json() {
        let leaves: Vec<Digest> = (0..9).map(leaf).collect();
        let proof = inclusion_proof(WindowKey::parse("2024-05-01").unwrap(), &leaves, 8).unwrap();

        let json = proof.to_json_pretty().unwrap();
        let parsed = InclusionProof::from_json(&json).unwrap();
        assert!(verify_proof(&parsed).is_ok());
    }

    proptest! {
        #[test]
        fn prop_compute_root_never_panics(
            leaf_bytes in prop::array::uniform32(any::<u8>()),
            steps in prop::collection::vec((prop::array::uniform32(any::<u8>()), any::<bool>()), 0..20)
        ) {
            let path: Vec<ProofStep> = steps
                .into_iter()
                .map(|(bytes, left)| ProofStep {
                    sibling_hash: Digest::new(bytes),
                    position: if left { Position::Left } else { Position::Right },
                })
                .collect();
            let _ = compute_root(&Digest::new(leaf_bytes), &path);
        }

        #[test]
        fn prop_tampered_sibling_fails(
            leaves in prop::collection::vec(prop::array::uniform32(any::<u8>()), 2..30),
            pick in any::<prop::sample::Index>(),
            flip in any::<u8>().prop_filter("non-zero", |b| *b != 0)
        ) {
            let leaves: Vec<Digest> = leaves.into_iter().map(Digest::new).collect();
            let index = pick.index(leaves.len());
            let mut proof = inclusion_proof(WindowKey::parse("2024-05-01").unwrap(), &leaves, index).unwrap();

            let mut bytes = *proof.sibling_path[0].sibling_hash.as_bytes();
            bytes[0] ^= flip;
            proof.sibling_path[0].sibling_hash = Digest::new(bytes);
            prop_assert!(verify_proof(&proof).is_err());
        }
    }
}

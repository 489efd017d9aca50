//! Core cryptographic functionality for TEL (Tamper-Evident Ledger)
//!
//! This crate provides:
//! - Text canonicalization ahead of any hashing
//! - Content hashes and keyed integrity tags binding text, owner and time
//! - Daily Merkle tree construction and inclusion-proof generation
//! - Inclusion-proof verification independent of the leaf set
//!
//! Every function here is pure and synchronous.

pub mod canonical;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod verify;

pub use canonical::{canonicalize, canonicalize_bytes};
pub use error::{CoreError, Result};
pub use hash::{
    content_hash, integrity_tag, IntegrityEngine, IntegrityStatus, RecordVerification, SealedText,
    SecretKey,
};
pub use merkle::{build_proof, build_root, hash_pair, inclusion_proof, MerkleTree, MerkleTreeBuilder};
pub use verify::{compute_root, verify, verify_hex, verify_proof, VerificationError};

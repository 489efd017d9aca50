//! Core types for TEL (Tamper-Evident Ledger)
//!
//! This crate defines the data structures and wire formats shared by the
//! hashing core, the ledger and any external verifier.

pub mod error;
pub mod messages;
pub mod primitives;

pub use error::{Error, Result};
pub use messages::{
    iso_millis, AnchorScope, AnchorWindow, AuditAction, AuditEvent, InclusionProof, ProofStep,
    Record,
};
pub use primitives::{Digest, OwnerId, Position, RecordId, WindowKey};

//! Error types for ledger wire types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid digest length: expected {expected} hex characters, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Hex encoding error: {0}")]
    HexEncoding(#[from] hex::FromHexError),

    #[error("Invalid window key {key:?}: expected YYYY-MM-DD")]
    InvalidWindowKey { key: String },

    #[error("Invalid proof position {0:?}: expected \"left\" or \"right\"")]
    InvalidPosition(String),

    #[error("Invalid owner id {0:?}: must be non-empty and single-line")]
    InvalidOwner(String),

    #[error("Invalid anchor scope {0:?}")]
    InvalidScope(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

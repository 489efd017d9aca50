//! Error types for the hashing core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The integrity secret is missing or empty. Fatal: tags computed
    /// without it would be forgeable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A proof was requested for a leaf outside the leaf set
    #[error("Leaf index {index} out of range for {len} leaves")]
    Index { index: usize, len: usize },
}

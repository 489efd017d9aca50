//! Ledger error taxonomy

use tel_core::CoreError;
use tel_types::{AnchorScope, WindowKey};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Missing or empty integrity secret. Not retryable without operator action.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `scope` is absent when no scope of the day had live records
    #[error("No records to anchor for {window}{}", scope_suffix(.scope))]
    NoLeaves {
        window: WindowKey,
        scope: Option<AnchorScope>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Leaf index {index} out of range for {len} leaves")]
    Index { index: usize, len: usize },

    #[error("Window {window} has not been anchored ({scope})")]
    NotAnchored { window: WindowKey, scope: AnchorScope },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config file error: {0}")]
    Config(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

fn scope_suffix(scope: &Option<AnchorScope>) -> String {
    scope.as_ref().map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(msg) => LedgerError::Configuration(msg),
            CoreError::Index { index, len } => LedgerError::Index { index, len },
        }
    }
}

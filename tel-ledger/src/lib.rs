//! Tamper-evident record ledger
//!
//! Owner-scoped records carrying a content hash and a keyed integrity tag,
//! grouped into UTC day windows that are committed to by Merkle roots.

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod sled_store;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, ScopeMode, StorageBackend, SECRET_ENV};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerSettings, ListQuery, Reanchor, RecordPage};
pub use scheduler::{AnchorHandle, AnchorRequest, AnchorScheduler};
pub use sled_store::SledStore;
pub use store::{AnchorEntry, LedgerStore, MemoryStore, SnapshotLeaf};

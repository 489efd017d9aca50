//! Test utilities for running an in-memory ledger on a controllable clock.
//!
//! Enabled via the `test-util` feature flag.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tel_core::{IntegrityEngine, SecretKey};
use tel_types::OwnerId;

use crate::clock::ManualClock;
use crate::config::ScopeMode;
use crate::ledger::{Ledger, LedgerSettings};
use crate::store::MemoryStore;

/// Secret used by every test ledger
pub const TEST_SECRET: &str = "test-integrity-secret";

/// A ledger over a [`MemoryStore`] whose clock only moves when told to.
///
/// Starts at 2024-05-01T09:00:00Z.
pub struct TestLedger {
    pub ledger: Arc<Ledger>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_scope(ScopeMode::Global)
    }

    pub fn with_scope(scope_mode: ScopeMode) -> Self {
        Self::with_settings(LedgerSettings {
            scope_mode,
            ..LedgerSettings::default()
        })
    }

    pub fn with_settings(settings: LedgerSettings) -> Self {
        let clock = Arc::new(ManualClock::new(Self::start()));
        let store = Arc::new(MemoryStore::new());
        let key = SecretKey::new(TEST_SECRET).expect("test secret is non-empty");
        let ledger = Ledger::new(store.clone(), IntegrityEngine::new(key), settings)
            .with_clock(clock.clone());

        Self {
            ledger: Arc::new(ledger),
            clock,
            store,
        }
    }

    /// The instant the clock starts at
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    /// An engine holding the same secret as the ledger
    pub fn engine() -> IntegrityEngine {
        IntegrityEngine::new(SecretKey::new(TEST_SECRET).expect("test secret is non-empty"))
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a valid owner id
pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).expect("valid test owner id")
}

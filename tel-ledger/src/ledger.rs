//! Owner-scoped record ledger with daily Merkle anchors
//!
//! Consistency policy: every mutation and every anchoring run holds the same
//! write lock, so an anchor is computed from a leaf set no write can
//! interleave with. Anchoring stores that ordered leaf set next to the root,
//! and inclusion proofs are always served from the stored snapshot. A window
//! that was never anchored has no proofs.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tel_core::{canonicalize, IntegrityEngine, MerkleTree, MerkleTreeBuilder, RecordVerification};
use tel_types::{
    AnchorScope, AnchorWindow, AuditAction, AuditEvent, InclusionProof, OwnerId, Record, RecordId,
    WindowKey,
};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, ScopeMode, StorageBackend};
use crate::error::{LedgerError, Result};
use crate::sled_store::SledStore;
use crate::store::{AnchorEntry, LedgerStore, MemoryStore, SnapshotLeaf};

/// Tunables taken from [`LedgerConfig`]
#[derive(Debug, Clone, Copy)]
pub struct LedgerSettings {
    pub scope_mode: ScopeMode,
    pub max_text_bytes: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            scope_mode: ScopeMode::Global,
            max_text_bytes: 65536,
        }
    }
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            scope_mode: config.anchoring.scope,
            max_text_bytes: config.integrity.max_text_bytes,
        }
    }
}

/// Whether anchoring may replace an existing anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reanchor {
    /// Recompute and overwrite
    Always,
    /// Leave windows that already have an anchor untouched
    IfMissing,
}

/// One page of an owner's live records, newest first
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub items: Vec<Record>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    /// Case-insensitive substring filter on record text
    pub search: Option<String>,
    /// 1-based page number
    pub page: usize,
    /// Page size, clamped to 1..=50
    pub limit: usize,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 50;
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    engine: IntegrityEngine,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, engine: IntegrityEngine, settings: LedgerSettings) -> Self {
        Self {
            store,
            engine,
            clock: Arc::new(SystemClock),
            settings,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open the configured store. Fails if no integrity secret is configured.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let key = config.integrity_key()?;

        let store: Arc<dyn LedgerStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Sled => Arc::new(SledStore::open(&config.storage.path)?),
        };

        info!(
            "Opened ledger ({:?} storage, {:?} anchoring)",
            config.storage.backend, config.anchoring.scope
        );

        Ok(Self::new(store, IntegrityEngine::new(key), LedgerSettings::from(config)))
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Current time, truncated so its ISO rendering round-trips exactly
    fn timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
    }

    fn audit(
        &self,
        owner: Option<&OwnerId>,
        action: AuditAction,
        record_id: Option<RecordId>,
        success: bool,
        detail: Option<String>,
    ) {
        let event = AuditEvent {
            seq: 0,
            owner: owner.cloned(),
            action,
            record_id,
            success,
            at: self.clock.now(),
            detail,
        };
        if let Err(e) = self.store.append_audit(event) {
            warn!("Audit event for {:?} could not be written: {}", action, e);
        }
    }

    /// Store a new record for `owner`
    pub fn append(&self, owner: &OwnerId, text: &str) -> Result<Record> {
        let canonical = canonicalize(text);
        if canonical.trim().is_empty() {
            return Err(LedgerError::InvalidInput("text is required".to_string()));
        }
        if canonical.len() > self.settings.max_text_bytes {
            return Err(LedgerError::InvalidInput(format!(
                "text exceeds max size of {} bytes",
                self.settings.max_text_bytes
            )));
        }

        let record = {
            let _guard = self.lock()?;
            let created_at = self.timestamp();
            let sealed = self.engine.seal(&canonical, &created_at, owner);
            let record = Record {
                id: self.store.next_record_id()?,
                owner: owner.clone(),
                text: sealed.text,
                content_hash: sealed.content_hash,
                integrity_tag: sealed.integrity_tag,
                created_at,
                tombstoned: false,
                tombstoned_at: None,
            };
            self.store.put_record(&record)?;
            record
        };

        debug!("Created record {} in window {}", record.id, record.window_key());
        self.audit(Some(owner), AuditAction::Create, Some(record.id), true, None);
        Ok(record)
    }

    /// Fetch one of `owner`'s records, tombstoned or not
    pub fn get(&self, owner: &OwnerId, id: RecordId) -> Result<Record> {
        match self.store.get_record(id)? {
            Some(record) if &record.owner == owner => Ok(record),
            _ => Err(LedgerError::NotFound(format!("record {}", id))),
        }
    }

    /// `owner`'s live records, newest first
    pub fn list(&self, owner: &OwnerId, query: &ListQuery) -> Result<RecordPage> {
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, ListQuery::MAX_LIMIT);
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matching: Vec<Record> = self
            .store
            .records_for_owner(owner)?
            .into_iter()
            .filter(|record| !record.tombstoned)
            .filter(|record| match &needle {
                Some(needle) => record.text.to_lowercase().contains(needle),
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        Ok(RecordPage {
            items,
            total,
            page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Re-derive a record's hash and tag and compare them with the stored ones
    pub fn verify(&self, owner: &OwnerId, id: RecordId) -> Result<RecordVerification> {
        let record = self.get(owner, id)?;
        let result = self.engine.verify_record(&record);

        if !result.verified() {
            warn!("Record {} failed verification: {}", id, result.status());
        }
        self.audit(
            Some(owner),
            AuditAction::Verify,
            Some(id),
            result.verified(),
            Some(format!("content_ok={} tag_ok={}", result.content_ok, result.tag_ok)),
        );
        Ok(result)
    }

    /// Mark a record deleted. It stays stored and is excluded from later anchors.
    pub fn tombstone(&self, owner: &OwnerId, id: RecordId) -> Result<Record> {
        let record = {
            let _guard = self.lock()?;
            let mut record = match self.store.get_record(id)? {
                Some(record) if &record.owner == owner && !record.tombstoned => record,
                _ => return Err(LedgerError::NotFound(format!("record {}", id))),
            };
            record.tombstoned = true;
            record.tombstoned_at = Some(self.timestamp());
            self.store.put_record(&record)?;
            record
        };

        debug!("Tombstoned record {}", id);
        self.audit(Some(owner), AuditAction::Tombstone, Some(id), true, None);
        Ok(record)
    }

    /// Re-canonicalize a record's text and recompute its hash and tag from
    /// the original owner and creation time
    pub fn rehash(&self, owner: &OwnerId, id: RecordId) -> Result<Record> {
        let record = {
            let _guard = self.lock()?;
            let mut record = self.get(owner, id)?;
            let sealed = self.engine.seal(&record.text, &record.created_at, &record.owner);
            record.text = sealed.text;
            record.content_hash = sealed.content_hash;
            record.integrity_tag = sealed.integrity_tag;
            self.store.put_record(&record)?;
            record
        };

        debug!("Rehashed record {}", id);
        self.audit(Some(owner), AuditAction::Rehash, Some(id), true, None);
        Ok(record)
    }

    /// The scope a record of `owner` is anchored under
    pub fn scope_for(&self, owner: &OwnerId) -> AnchorScope {
        match self.settings.scope_mode {
            ScopeMode::Global => AnchorScope::Global,
            ScopeMode::PerOwner => AnchorScope::Owner(owner.clone()),
        }
    }

    /// Anchor one window in one scope.
    ///
    /// A scope left without live records loses any anchor it had, and the
    /// call fails with `NoLeaves`.
    pub fn anchor(&self, window: WindowKey, scope: &AnchorScope) -> Result<AnchorWindow> {
        let result = {
            let _guard = self.lock()?;
            self.anchor_locked(window, scope)
        };
        self.audit_anchor(window, scope, &result);
        result
    }

    fn audit_anchor(&self, window: WindowKey, scope: &AnchorScope, result: &Result<AnchorWindow>) {
        let owner = match scope {
            AnchorScope::Global => None,
            AnchorScope::Owner(owner) => Some(owner),
        };
        match result {
            Ok(anchor) => self.audit(
                owner,
                AuditAction::Anchor,
                None,
                true,
                Some(format!("{} {} root={}", anchor.window_key, anchor.scope, anchor.root_hash)),
            ),
            Err(e) => self.audit(
                owner,
                AuditAction::Anchor,
                None,
                false,
                Some(format!("{} {}: {}", window, scope, e)),
            ),
        }
    }

    fn anchor_locked(&self, window: WindowKey, scope: &AnchorScope) -> Result<AnchorWindow> {
        let leaves: Vec<SnapshotLeaf> = self
            .store
            .records_in_window(&window)?
            .into_iter()
            .filter(|record| !record.tombstoned && scope.includes(&record.owner))
            .map(|record| SnapshotLeaf {
                record_id: record.id,
                content_hash: record.content_hash,
            })
            .collect();

        let mut builder = MerkleTreeBuilder::with_capacity(leaves.len());
        for leaf in &leaves {
            builder.add_leaf(leaf.content_hash);
        }
        let Some(tree) = builder.build() else {
            if self.store.remove_anchor(scope, &window)? {
                info!("Removed anchor for {} ({}): no live records left", window, scope);
            }
            return Err(LedgerError::NoLeaves {
                window,
                scope: Some(scope.clone()),
            });
        };

        let anchor = AnchorWindow {
            window_key: window,
            scope: scope.clone(),
            root_hash: *tree.root(),
            leaf_count: tree.leaf_count() as u64,
            anchored_at: self.timestamp(),
        };
        self.store.put_anchor(&AnchorEntry {
            anchor: anchor.clone(),
            leaves,
        })?;

        info!(
            "Anchored {} ({}) with {} leaves, root {}",
            window, scope, anchor.leaf_count, anchor.root_hash
        );
        Ok(anchor)
    }

    /// Scopes `window` is anchored under: the global scope, or every owner
    /// with live records that day plus every owner already anchored for it
    fn day_scopes(&self, window: WindowKey) -> Result<Vec<AnchorScope>> {
        Ok(match self.settings.scope_mode {
            ScopeMode::Global => vec![AnchorScope::Global],
            ScopeMode::PerOwner => {
                let mut scopes: BTreeSet<AnchorScope> = self
                    .store
                    .records_in_window(&window)?
                    .into_iter()
                    .filter(|record| !record.tombstoned)
                    .map(|record| AnchorScope::Owner(record.owner))
                    .collect();
                scopes.extend(
                    self.store
                        .list_anchors()?
                        .into_iter()
                        .filter(|anchor| {
                            anchor.window_key == window && matches!(anchor.scope, AnchorScope::Owner(_))
                        })
                        .map(|anchor| anchor.scope),
                );
                scopes.into_iter().collect()
            }
        })
    }

    /// Anchor every scope of `window` in one pass under the write lock.
    ///
    /// Scopes that turn out empty are skipped (and lose any stale anchor);
    /// the call fails with `NoLeaves` only when no scope has live records.
    pub fn anchor_day(&self, window: WindowKey, reanchor: Reanchor) -> Result<Vec<AnchorWindow>> {
        // (scope, outcome, whether it was recomputed)
        let mut outcomes = Vec::new();
        {
            let _guard = self.lock()?;
            for scope in self.day_scopes(window)? {
                if reanchor == Reanchor::IfMissing {
                    if let Some(existing) = self.store.get_anchor(&scope, &window)? {
                        debug!("Window {} ({}) already anchored", window, scope);
                        outcomes.push((scope, Ok(existing.anchor), false));
                        continue;
                    }
                }
                let result = self.anchor_locked(window, &scope);
                let fatal = !matches!(result, Ok(_) | Err(LedgerError::NoLeaves { .. }));
                outcomes.push((scope, result, true));
                if fatal {
                    break;
                }
            }
        }

        let mut anchors = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for (scope, result, recomputed) in outcomes {
            if recomputed {
                self.audit_anchor(window, &scope, &result);
            }
            match result {
                Ok(anchor) => anchors.push(anchor),
                Err(LedgerError::NoLeaves { .. }) => {
                    debug!("Window {} ({}) has no live records", window, scope)
                }
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        if anchors.is_empty() {
            let scope = match self.settings.scope_mode {
                ScopeMode::Global => Some(AnchorScope::Global),
                ScopeMode::PerOwner => None,
            };
            return Err(LedgerError::NoLeaves { window, scope });
        }
        Ok(anchors)
    }

    pub fn anchor_for(&self, window: &WindowKey, scope: &AnchorScope) -> Result<Option<AnchorWindow>> {
        Ok(self.store.get_anchor(scope, window)?.map(|entry| entry.anchor))
    }

    pub fn anchors(&self) -> Result<Vec<AnchorWindow>> {
        self.store.list_anchors()
    }

    /// Inclusion proof for a record against its window's stored anchor
    pub fn inclusion_proof(&self, id: RecordId) -> Result<InclusionProof> {
        let record = self
            .store
            .get_record(id)?
            .ok_or_else(|| LedgerError::NotFound(format!("record {}", id)))?;
        let window = record.window_key();
        let scope = self.scope_for(&record.owner);

        let result = self.proof_from_snapshot(id, window, &scope);
        self.audit(
            Some(&record.owner),
            AuditAction::Proof,
            Some(id),
            result.is_ok(),
            result.as_ref().err().map(|e| e.to_string()),
        );
        result
    }

    fn proof_from_snapshot(
        &self,
        id: RecordId,
        window: WindowKey,
        scope: &AnchorScope,
    ) -> Result<InclusionProof> {
        let entry = self
            .store
            .get_anchor(scope, &window)?
            .ok_or_else(|| LedgerError::NotAnchored {
                window,
                scope: scope.clone(),
            })?;

        let index = entry.position_of(id).ok_or_else(|| {
            LedgerError::NotFound(format!("record {} is not in the {} anchor for {}", id, scope, window))
        })?;

        let tree = MerkleTree::from_leaves(entry.leaf_hashes()).ok_or_else(|| {
            LedgerError::Storage(format!("anchor for {} ({}) has no leaves", window, scope))
        })?;
        if tree.root() != &entry.anchor.root_hash {
            return Err(LedgerError::Storage(format!(
                "anchor snapshot for {} ({}) does not reproduce its root",
                window, scope
            )));
        }

        Ok(tree.inclusion_proof(window, index)?)
    }

    /// Audit trail, optionally limited to one owner's events
    pub fn audit_log(&self, owner: Option<&OwnerId>) -> Result<Vec<AuditEvent>> {
        let events = self.store.audit_events()?;
        Ok(match owner {
            Some(owner) => events
                .into_iter()
                .filter(|event| event.owner.as_ref() == Some(owner))
                .collect(),
            None => events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{owner, TestLedger};
    use proptest::prelude::*;
    use tel_core::verify_proof;

    #[test]
    fn test_list_query_defaults() {
        let t = TestLedger::new();
        t.ledger.append(&owner("alice"), "only").unwrap();

        let page = t.ledger.list(&owner("alice"), &ListQuery::default()).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, ListQuery::DEFAULT_LIMIT);
        assert_eq!(page.pages, 1);
        assert_eq!(page.items.len(), 1);

        // Zero is clamped up to one item per page
        let tiny = t
            .ledger
            .list(&owner("alice"), &ListQuery { limit: 0, ..Default::default() })
            .unwrap();
        assert_eq!(tiny.limit, 1);
    }

    #[test]
    fn test_scope_for_follows_mode() {
        let alice = owner("alice");
        assert_eq!(TestLedger::new().ledger.scope_for(&alice), AnchorScope::Global);
        assert_eq!(
            TestLedger::with_scope(ScopeMode::PerOwner).ledger.scope_for(&alice),
            AnchorScope::Owner(alice.clone())
        );
    }

    proptest! {
        #[test]
        fn prop_anchor_covers_exactly_live_records(
            ops in prop::collection::vec((0u8..3, any::<bool>()), 1..40)
        ) {
            let t = TestLedger::new();
            let window = WindowKey::for_instant(TestLedger::start());

            let mut live = Vec::new();
            let mut dead = Vec::new();
            for (i, (who, tombstone)) in ops.into_iter().enumerate() {
                let me = owner(&format!("owner-{}", who));
                let record = t.ledger.append(&me, &format!("entry {}", i)).unwrap();
                if tombstone {
                    t.ledger.tombstone(&me, record.id).unwrap();
                    dead.push(record.id);
                } else {
                    live.push(record);
                }
            }

            match t.ledger.anchor(window, &AnchorScope::Global) {
                Ok(anchor) => {
                    prop_assert_eq!(anchor.leaf_count as usize, live.len());
                    for (index, record) in live.iter().enumerate() {
                        let proof = t.ledger.inclusion_proof(record.id).unwrap();
                        prop_assert_eq!(proof.leaf_index as usize, index);
                        prop_assert!(verify_proof(&proof).is_ok());
                    }
                    for id in dead {
                        let missing = matches!(t.ledger.inclusion_proof(id), Err(LedgerError::NotFound(_)));
                        prop_assert!(missing);
                    }
                }
                Err(LedgerError::NoLeaves { .. }) => prop_assert!(live.is_empty()),
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }
    }
}

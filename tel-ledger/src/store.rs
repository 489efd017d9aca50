//! Storage collaborator for records, anchors and the audit trail

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tel_types::{
    AnchorScope, AnchorWindow, AuditEvent, Digest, OwnerId, Record, RecordId, WindowKey,
};

use crate::error::{LedgerError, Result};

/// One leaf of an anchored window, as it was when the anchor was computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLeaf {
    pub record_id: RecordId,
    pub content_hash: Digest,
}

/// An anchor together with the ordered leaf set its root was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorEntry {
    pub anchor: AnchorWindow,
    pub leaves: Vec<SnapshotLeaf>,
}

impl AnchorEntry {
    pub fn leaf_hashes(&self) -> Vec<Digest> {
        self.leaves.iter().map(|leaf| leaf.content_hash).collect()
    }

    pub fn position_of(&self, record_id: RecordId) -> Option<usize> {
        self.leaves.iter().position(|leaf| leaf.record_id == record_id)
    }
}

/// Persistence for the ledger.
///
/// Records are never deleted. Implementations must return window records in
/// ascending id order, which is the leaf order anchors commit to.
pub trait LedgerStore: Send + Sync {
    /// Allocate an id greater than every id handed out before
    fn next_record_id(&self) -> Result<RecordId>;

    /// Insert or replace a record
    fn put_record(&self, record: &Record) -> Result<()>;

    fn get_record(&self, id: RecordId) -> Result<Option<Record>>;

    /// All records created within `window`, tombstoned ones included, by id
    fn records_in_window(&self, window: &WindowKey) -> Result<Vec<Record>>;

    /// All records of one owner, tombstoned ones included, by id
    fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<Record>>;

    /// Insert or replace the anchor for its (scope, window)
    fn put_anchor(&self, entry: &AnchorEntry) -> Result<()>;

    fn get_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<Option<AnchorEntry>>;

    /// Drop the anchor for (scope, window). Returns whether one existed.
    fn remove_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<bool>;

    fn list_anchors(&self) -> Result<Vec<AnchorWindow>>;

    /// Append an audit event, assigning its sequence number
    fn append_audit(&self, event: AuditEvent) -> Result<AuditEvent>;

    fn audit_events(&self) -> Result<Vec<AuditEvent>>;
}

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    records: BTreeMap<RecordId, Record>,
    anchors: BTreeMap<(AnchorScope, WindowKey), AnchorEntry>,
    audit: Vec<AuditEvent>,
}

/// In-process store, for tests and ephemeral ledgers
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryInner>> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryInner>> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl LedgerStore for MemoryStore {
    fn next_record_id(&self) -> Result<RecordId> {
        let mut inner = self.write()?;
        inner.next_id += 1;
        Ok(RecordId(inner.next_id))
    }

    fn put_record(&self, record: &Record) -> Result<()> {
        self.write()?.records.insert(record.id, record.clone());
        Ok(())
    }

    fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    fn records_in_window(&self, window: &WindowKey) -> Result<Vec<Record>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|record| window.contains(record.created_at))
            .cloned()
            .collect())
    }

    fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<Record>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|record| &record.owner == owner)
            .cloned()
            .collect())
    }

    fn put_anchor(&self, entry: &AnchorEntry) -> Result<()> {
        let key = (entry.anchor.scope.clone(), entry.anchor.window_key);
        self.write()?.anchors.insert(key, entry.clone());
        Ok(())
    }

    fn get_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<Option<AnchorEntry>> {
        Ok(self.read()?.anchors.get(&(scope.clone(), *window)).cloned())
    }

    fn remove_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<bool> {
        Ok(self.write()?.anchors.remove(&(scope.clone(), *window)).is_some())
    }

    fn list_anchors(&self) -> Result<Vec<AnchorWindow>> {
        Ok(self
            .read()?
            .anchors
            .values()
            .map(|entry| entry.anchor.clone())
            .collect())
    }

    fn append_audit(&self, mut event: AuditEvent) -> Result<AuditEvent> {
        let mut inner = self.write()?;
        event.seq = inner.audit.len() as u64 + 1;
        inner.audit.push(event.clone());
        Ok(event)
    }

    fn audit_events(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.read()?.audit.clone())
    }
}

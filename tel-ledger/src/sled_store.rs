//! Persistent ledger storage on sled

use sled::{Db, Tree};
use tel_types::{AnchorScope, AnchorWindow, AuditEvent, OwnerId, Record, RecordId, WindowKey};

use crate::error::{LedgerError, Result};
use crate::store::{AnchorEntry, LedgerStore};

fn storage_err(context: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("{}: {}", context, e))
}

/// sled-backed store.
///
/// Records are keyed by big-endian id so every scan yields insertion order.
/// Window and owner lookups go through prefix indexes that end in the id.
pub struct SledStore {
    db: Db,
    records: Tree,
    by_window: Tree,
    by_owner: Tree,
    anchors: Tree,
    audit: Tree,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| storage_err("Failed to open database", e))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let open = |name: &str| {
            db.open_tree(name)
                .map_err(|e| storage_err(&format!("Failed to open tree {}", name), e))
        };
        Ok(Self {
            records: open("records")?,
            by_window: open("records_by_window")?,
            by_owner: open("records_by_owner")?,
            anchors: open("anchors")?,
            audit: open("audit")?,
            db,
        })
    }

    fn window_prefix(window: &WindowKey) -> Vec<u8> {
        window.to_string().into_bytes()
    }

    fn owner_prefix(owner: &OwnerId) -> Vec<u8> {
        let bytes = owner.as_str().as_bytes();
        let mut prefix = Vec::with_capacity(4 + bytes.len());
        prefix.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        prefix.extend_from_slice(bytes);
        prefix
    }

    fn index_key(mut prefix: Vec<u8>, id: RecordId) -> Vec<u8> {
        prefix.extend_from_slice(&id.0.to_be_bytes());
        prefix
    }

    fn anchor_key(scope: &AnchorScope, window: &WindowKey) -> Vec<u8> {
        // Window keys are fixed width, so the scope can follow unseparated
        let mut key = Self::window_prefix(window);
        key.extend_from_slice(scope.to_string().as_bytes());
        key
    }

    fn id_from_index_key(key: &[u8]) -> Result<RecordId> {
        let tail = key
            .len()
            .checked_sub(8)
            .map(|start| &key[start..])
            .ok_or_else(|| LedgerError::Storage("Truncated index key".to_string()))?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(tail);
        Ok(RecordId(u64::from_be_bytes(bytes)))
    }

    fn records_by_index(&self, index: &Tree, prefix: Vec<u8>) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for item in index.scan_prefix(prefix) {
            let (key, _) = item.map_err(|e| storage_err("Failed to iterate index", e))?;
            let id = Self::id_from_index_key(&key)?;
            // Index entries are written first; a missing record was never committed
            if let Some(record) = self.get_record(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn generate_id(&self) -> Result<u64> {
        self.db
            .generate_id()
            .map(|id| id + 1)
            .map_err(|e| storage_err("Failed to generate id", e))
    }
}

impl LedgerStore for SledStore {
    fn next_record_id(&self) -> Result<RecordId> {
        self.generate_id().map(RecordId)
    }

    fn put_record(&self, record: &Record) -> Result<()> {
        let value = serde_json::to_vec(record)
            .map_err(|e| storage_err("Failed to serialize record", e))?;

        let window_key = Self::index_key(Self::window_prefix(&record.window_key()), record.id);
        let owner_key = Self::index_key(Self::owner_prefix(&record.owner), record.id);
        self.by_window
            .insert(window_key, Vec::<u8>::new())
            .map_err(|e| storage_err("Failed to index record", e))?;
        self.by_owner
            .insert(owner_key, Vec::<u8>::new())
            .map_err(|e| storage_err("Failed to index record", e))?;

        self.records
            .insert(record.id.0.to_be_bytes(), value)
            .map_err(|e| storage_err("Failed to store record", e))?;

        self.db
            .flush()
            .map_err(|e| storage_err("Failed to flush database", e))?;

        Ok(())
    }

    fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        let value = self
            .records
            .get(id.0.to_be_bytes())
            .map_err(|e| storage_err("Failed to retrieve record", e))?;

        match value {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| storage_err("Failed to deserialize record", e))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn records_in_window(&self, window: &WindowKey) -> Result<Vec<Record>> {
        self.records_by_index(&self.by_window, Self::window_prefix(window))
    }

    fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<Record>> {
        self.records_by_index(&self.by_owner, Self::owner_prefix(owner))
    }

    fn put_anchor(&self, entry: &AnchorEntry) -> Result<()> {
        let key = Self::anchor_key(&entry.anchor.scope, &entry.anchor.window_key);
        let value = serde_json::to_vec(entry)
            .map_err(|e| storage_err("Failed to serialize anchor", e))?;

        self.anchors
            .insert(key, value)
            .map_err(|e| storage_err("Failed to store anchor", e))?;

        self.db
            .flush()
            .map_err(|e| storage_err("Failed to flush database", e))?;

        Ok(())
    }

    fn get_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<Option<AnchorEntry>> {
        let value = self
            .anchors
            .get(Self::anchor_key(scope, window))
            .map_err(|e| storage_err("Failed to retrieve anchor", e))?;

        match value {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes)
                    .map_err(|e| storage_err("Failed to deserialize anchor", e))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn remove_anchor(&self, scope: &AnchorScope, window: &WindowKey) -> Result<bool> {
        let removed = self
            .anchors
            .remove(Self::anchor_key(scope, window))
            .map_err(|e| storage_err("Failed to remove anchor", e))?;

        self.db
            .flush()
            .map_err(|e| storage_err("Failed to flush database", e))?;

        Ok(removed.is_some())
    }

    fn list_anchors(&self) -> Result<Vec<AnchorWindow>> {
        let mut anchors = Vec::new();

        for item in self.anchors.iter() {
            let (_, value) = item.map_err(|e| storage_err("Failed to iterate anchors", e))?;
            let entry: AnchorEntry = serde_json::from_slice(&value)
                .map_err(|e| storage_err("Failed to deserialize anchor", e))?;
            anchors.push(entry.anchor);
        }

        Ok(anchors)
    }

    fn append_audit(&self, mut event: AuditEvent) -> Result<AuditEvent> {
        event.seq = self.generate_id()?;
        let value = serde_json::to_vec(&event)
            .map_err(|e| storage_err("Failed to serialize audit event", e))?;

        self.audit
            .insert(event.seq.to_be_bytes(), value)
            .map_err(|e| storage_err("Failed to store audit event", e))?;

        Ok(event)
    }

    fn audit_events(&self) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();

        for item in self.audit.iter() {
            let (_, value) = item.map_err(|e| storage_err("Failed to iterate audit log", e))?;
            let event = serde_json::from_slice(&value)
                .map_err(|e| storage_err("Failed to deserialize audit event", e))?;
            events.push(event);
        }

        Ok(events)
    }
}

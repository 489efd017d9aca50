//! Record, anchor and proof definitions exchanged with storage and verifiers

use crate::error::Error;
use crate::primitives::{Digest, OwnerId, Position, RecordId, WindowKey};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stored text record with its integrity material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub owner: OwnerId,
    /// Canonical text; the only form that is ever stored
    pub text: String,
    /// SHA-256 of the canonical text
    pub content_hash: Digest,
    /// HMAC-SHA256 over text, creation time and owner
    pub integrity_tag: Digest,
    /// Creation time, millisecond precision
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tombstoned: bool,
    #[serde(default)]
    pub tombstoned_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creation time as bound into the integrity tag, e.g. `2024-05-01T08:30:00.000Z`
    pub fn created_at_iso(&self) -> String {
        iso_millis(&self.created_at)
    }

    /// The anchoring window this record falls into
    pub fn window_key(&self) -> WindowKey {
        WindowKey::for_instant(self.created_at)
    }
}

/// Render an instant the way integrity tags bind it
pub fn iso_millis(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The domain an anchor commits to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnchorScope {
    /// Every owner's records for the day
    Global,
    /// One owner's records for the day
    Owner(OwnerId),
}

impl AnchorScope {
    const OWNER_PREFIX: &'static str = "owner:";

    pub fn includes(&self, owner: &OwnerId) -> bool {
        match self {
            AnchorScope::Global => true,
            AnchorScope::Owner(scoped) => scoped == owner,
        }
    }
}

impl fmt::Display for AnchorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorScope::Global => f.write_str("global"),
            AnchorScope::Owner(owner) => write!(f, "{}{}", Self::OWNER_PREFIX, owner),
        }
    }
}

impl FromStr for AnchorScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s == "global" {
            return Ok(AnchorScope::Global);
        }
        match s.strip_prefix(Self::OWNER_PREFIX) {
            Some(owner) => OwnerId::new(owner)
                .map(AnchorScope::Owner)
                .map_err(|_| Error::InvalidScope(s.to_string())),
            None => Err(Error::InvalidScope(s.to_string())),
        }
    }
}

impl Serialize for AnchorScope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AnchorScope {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The Merkle anchor for one window in one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorWindow {
    pub window_key: WindowKey,
    pub scope: AnchorScope,
    pub root_hash: Digest,
    pub leaf_count: u64,
    pub anchored_at: DateTime<Utc>,
}

/// One step of an inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStep {
    pub sibling_hash: Digest,
    /// Where the node being folded sits relative to `sibling_hash`
    pub position: Position,
}

/// Proof that `leaf_hash` is committed to by `root_hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    pub window_key: WindowKey,
    pub root_hash: Digest,
    pub leaf_hash: Digest,
    pub leaf_index: u64,
    pub sibling_path: Vec<ProofStep>,
}

impl InclusionProof {
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Kinds of ledger operations recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Verify,
    Tombstone,
    Rehash,
    Anchor,
    Proof,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Verify => "verify",
            AuditAction::Tombstone => "tombstone",
            AuditAction::Rehash => "rehash",
            AuditAction::Anchor => "anchor",
            AuditAction::Proof => "proof",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An append-only audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub seq: u64,
    /// Acting owner; absent for system actions such as global anchoring
    pub owner: Option<OwnerId>,
    pub action: AuditAction,
    pub record_id: Option<RecordId>,
    pub success: bool,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

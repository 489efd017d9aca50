//! Content hashes and keyed integrity tags

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use tel_types::{iso_millis, Digest, OwnerId, Record, RecordId};

use crate::canonical::canonicalize;
use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of arbitrary bytes
pub(crate) fn sha256(bytes: &[u8]) -> Digest {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    Digest::new(out)
}

/// SHA-256 of the canonical form of `text`
pub fn content_hash(text: &str) -> Digest {
    sha256(canonicalize(text).as_bytes())
}

/// The integrity secret. Required; never empty.
#[derive(Clone)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(CoreError::Configuration(
                "integrity secret is required and must be non-empty".to_string(),
            ));
        }
        Ok(Self(secret.into_bytes()))
    }

    /// Resolve an optional secret, rejecting absence the same way as emptiness
    pub fn require(secret: Option<&str>) -> Result<Self> {
        match secret {
            Some(secret) => Self::new(secret),
            None => Err(CoreError::Configuration(
                "integrity secret is not configured".to_string(),
            )),
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Canonical text together with its content hash and integrity tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedText {
    pub text: String,
    pub content_hash: Digest,
    pub integrity_tag: Digest,
}

/// Outcome of re-deriving a stored record's hash and tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordVerification {
    pub record_id: RecordId,
    pub content_ok: bool,
    pub tag_ok: bool,
    pub stored_hash: Digest,
    pub recomputed_hash: Digest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Intact,
    /// Text no longer matches its content hash
    ContentTampered,
    /// Text matches, but the tag no longer binds it to this owner and time
    BindingBroken,
}

impl RecordVerification {
    pub fn verified(&self) -> bool {
        self.content_ok && self.tag_ok
    }

    pub fn status(&self) -> IntegrityStatus {
        match (self.content_ok, self.tag_ok) {
            (true, true) => IntegrityStatus::Intact,
            (false, _) => IntegrityStatus::ContentTampered,
            (true, false) => IntegrityStatus::BindingBroken,
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrityStatus::Intact => "intact",
            IntegrityStatus::ContentTampered => "content tampered",
            IntegrityStatus::BindingBroken => "binding broken",
        };
        f.write_str(s)
    }
}

/// Computes and checks integrity tags with a fixed secret.
///
/// Immutable once built, so one engine can be shared across threads.
#[derive(Debug, Clone)]
pub struct IntegrityEngine {
    key: SecretKey,
}

impl IntegrityEngine {
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// HMAC-SHA256 over `canonical(text) \n created_at_iso \n owner_id`
    pub fn integrity_tag(&self, text: &str, created_at_iso: &str, owner_id: &str) -> Digest {
        let canonical = canonicalize(text);
        let mut mac = HmacSha256::new_from_slice(&self.key.0)
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        mac.update(b"\n");
        mac.update(created_at_iso.as_bytes());
        mac.update(b"\n");
        mac.update(owner_id.as_bytes());

        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Digest::new(out)
    }

    /// Canonicalize `text` and derive both integrity values for it
    pub fn seal(&self, text: &str, created_at: &DateTime<Utc>, owner: &OwnerId) -> SealedText {
        let canonical = canonicalize(text);
        let content_hash = sha256(canonical.as_bytes());
        let integrity_tag = self.integrity_tag(&canonical, &iso_millis(created_at), owner.as_str());
        SealedText {
            text: canonical,
            content_hash,
            integrity_tag,
        }
    }

    /// Re-derive a record's hash and tag from its stored text, owner and
    /// creation time, and compare each against the stored value
    pub fn verify_record(&self, record: &Record) -> RecordVerification {
        let recomputed_hash = content_hash(&record.text);
        let recomputed_tag = self.integrity_tag(
            &record.text,
            &record.created_at_iso(),
            record.owner.as_str(),
        );

        RecordVerification {
            record_id: record.id,
            content_ok: recomputed_hash == record.content_hash,
            tag_ok: recomputed_tag == record.integrity_tag,
            stored_hash: record.content_hash,
            recomputed_hash,
        }
    }
}

/// One-shot integrity tag for callers holding an optional secret
pub fn integrity_tag(
    text: &str,
    created_at_iso: &str,
    owner_id: &str,
    secret: Option<&str>,
) -> Result<Digest> {
    let key = SecretKey::require(secret)?;
    Ok(IntegrityEngine::new(key).integrity_tag(text, created_at_iso, owner_id))
}

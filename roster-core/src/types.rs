//! Domain types shared by every roster crate.
//!
//! Identifiers are newtypes over `String` so a remote id can never be passed
//! where a fingerprint is expected. All types serialize with serde so the
//! identity store and config files can persist them directly.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier the remote directory assigned to a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of the remote collection (contact folder) a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CollectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable local identity of a logical record, independent of its content.
///
/// Two records with the same key are the same entity; a different
/// fingerprint under the same key means the entity changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Lowercase hex content digest of a normalized [`LogicalRecord`](crate::LogicalRecord).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Identity entries
// ---------------------------------------------------------------------------

/// One remote record created by this engine, and the content it was last
/// written with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub remote_id: RemoteId,
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,
}

impl IdentityEntry {
    pub fn new(remote_id: RemoteId, fingerprint: Fingerprint, key: Option<RecordKey>) -> Self {
        Self {
            remote_id,
            fingerprint,
            key,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(RemoteId::from("AAMk-1").to_string(), "AAMk-1");
        assert_eq!(RecordKey::from("contact:a|").to_string(), "contact:a|");
        assert_eq!(CollectionId::from("folder").to_string(), "folder");
    }

    #[test]
    fn fingerprint_short_is_prefix() {
        let fp = Fingerprint::from("0123456789abcdef0123");
        assert_eq!(fp.short(), "0123456789ab");
        assert_eq!(Fingerprint::from("abc").short(), "abc");
    }

    #[test]
    fn entry_without_key_omits_field() {
        let entry = IdentityEntry::new(RemoteId::from("r1"), Fingerprint::from("f1"), None);
        let json = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(json, r#"{"remote_id":"r1","fingerprint":"f1"}"#);
        let back: IdentityEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }
}

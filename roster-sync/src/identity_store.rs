//! Identity store: durable `remote_id ↔ fingerprint` mapping.
//!
//! [`JsonIdentityStore`] persists an [`IdentityStoreFile`] JSON document,
//! by default at `<home>/.roster/identities/<collection>.json`. Every
//! mutation is written through with the atomic `.tmp` + rename pattern, so an
//! interrupted run leaves the file as of its last successful upsert/remove.
//!
//! [`IdentityIndex`] is the in-memory lookup built once per run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roster_core::{Fingerprint, IdentityEntry, RecordKey, RemoteId};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Persistence contract the reconciler relies on.
///
/// The store is owned by exactly one run at a time.
pub trait IdentityStore {
    /// Every entry. Fails with [`SyncError::StoreUnavailable`] when the
    /// backing medium cannot be read.
    fn load_all(&mut self) -> Result<Vec<IdentityEntry>, SyncError>;

    /// Insert `entry`, or replace the entry with the same remote id.
    /// Repeating the call with identical arguments is a no-op.
    fn upsert(&mut self, entry: &IdentityEntry) -> Result<(), SyncError>;

    /// Upsert several entries; stores may persist them in one write.
    fn upsert_many(&mut self, entries: &[IdentityEntry]) -> Result<(), SyncError> {
        for entry in entries {
            self.upsert(entry)?;
        }
        Ok(())
    }

    /// Delete entries by remote id. Unknown ids are ignored.
    fn remove(&mut self, ids: &[RemoteId]) -> Result<(), SyncError>;

    /// Stamp the store with the completion time of a run.
    fn record_run(&mut self, _at: DateTime<Utc>) -> Result<(), SyncError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// On-disk identity store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityStoreFile {
    pub synced_at: Option<DateTime<Utc>>,
    pub entries: Vec<IdentityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdentityStoreCompat {
    Structured(IdentityStoreFile),
    Legacy(Vec<LegacyControlEntry>),
}

/// Control-file rows written by the earlier script: `{contact_id, hash}`.
#[derive(Debug, Deserialize)]
struct LegacyControlEntry {
    contact_id: String,
    hash: String,
}

/// File-backed [`IdentityStore`].
#[derive(Debug)]
pub struct JsonIdentityStore {
    path: PathBuf,
    synced_at: Option<DateTime<Utc>>,
    entries: BTreeMap<RemoteId, IdentityEntry>,
}

impl JsonIdentityStore {
    /// A store at `path`. Nothing is read until [`IdentityStore::load_all`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            synced_at: None,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Completion time of the last recorded run, once loaded.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// Read the file without touching in-memory state.
    ///
    /// Returns an empty store if the file does not yet exist.
    pub fn read_file(path: &Path) -> Result<IdentityStoreFile, SyncError> {
        if !path.exists() {
            return Ok(IdentityStoreFile {
                synced_at: None,
                entries: Vec::new(),
            });
        }
        let unavailable = |reason: String| SyncError::StoreUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        match serde_json::from_str::<IdentityStoreCompat>(&contents)
            .map_err(|e| unavailable(e.to_string()))?
        {
            IdentityStoreCompat::Structured(file) => Ok(file),
            IdentityStoreCompat::Legacy(rows) => Ok(IdentityStoreFile {
                synced_at: None,
                entries: rows
                    .into_iter()
                    .map(|row| {
                        IdentityEntry::new(
                            RemoteId(row.contact_id),
                            Fingerprint(row.hash),
                            None,
                        )
                    })
                    .collect(),
            }),
        }
    }

    /// Write the current state atomically.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`.
    fn save(&self) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }

        let file = IdentityStoreFile {
            synced_at: self.synced_at,
            entries: self.entries.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

impl IdentityStore for JsonIdentityStore {
    fn load_all(&mut self) -> Result<Vec<IdentityEntry>, SyncError> {
        let file = Self::read_file(&self.path)?;
        self.synced_at = file.synced_at;
        self.entries = file
            .entries
            .into_iter()
            .map(|e| (e.remote_id.clone(), e))
            .collect();
        Ok(self.entries.values().cloned().collect())
    }

    fn upsert(&mut self, entry: &IdentityEntry) -> Result<(), SyncError> {
        if self.entries.get(&entry.remote_id) == Some(entry) {
            return Ok(());
        }
        self.entries.insert(entry.remote_id.clone(), entry.clone());
        self.save()
    }

    fn upsert_many(&mut self, entries: &[IdentityEntry]) -> Result<(), SyncError> {
        let mut changed = false;
        for entry in entries {
            if self.entries.get(&entry.remote_id) != Some(entry) {
                self.entries.insert(entry.remote_id.clone(), entry.clone());
                changed = true;
            }
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    fn remove(&mut self, ids: &[RemoteId]) -> Result<(), SyncError> {
        let before = self.entries.len();
        for id in ids {
            self.entries.remove(id);
        }
        if self.entries.len() != before {
            self.save()?;
        }
        Ok(())
    }

    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.synced_at = Some(at);
        self.save()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile [`IdentityStore`] for tests and one-off dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    entries: BTreeMap<RemoteId, IdentityEntry>,
    synced_at: Option<DateTime<Utc>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = IdentityEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.remote_id.clone(), e))
                .collect(),
            synced_at: None,
        }
    }

    pub fn entries(&self) -> Vec<IdentityEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, id: &RemoteId) -> Option<&IdentityEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load_all(&mut self) -> Result<Vec<IdentityEntry>, SyncError> {
        Ok(self.entries())
    }

    fn upsert(&mut self, entry: &IdentityEntry) -> Result<(), SyncError> {
        self.entries.insert(entry.remote_id.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, ids: &[RemoteId]) -> Result<(), SyncError> {
        for id in ids {
            self.entries.remove(id);
        }
        Ok(())
    }

    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.synced_at = Some(at);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Keyed lookups over a store snapshot: by remote id, fingerprint and key.
///
/// When several entries share a fingerprint or key (possible in stores
/// migrated from the legacy control file), the lowest remote id wins so the
/// choice is stable between runs.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_remote: BTreeMap<RemoteId, IdentityEntry>,
    by_fingerprint: HashMap<Fingerprint, RemoteId>,
    by_key: HashMap<RecordKey, RemoteId>,
}

impl IdentityIndex {
    pub fn new(entries: impl IntoIterator<Item = IdentityEntry>) -> Self {
        let by_remote: BTreeMap<RemoteId, IdentityEntry> = entries
            .into_iter()
            .map(|e| (e.remote_id.clone(), e))
            .collect();
        let mut by_fingerprint = HashMap::new();
        let mut by_key = HashMap::new();
        for entry in by_remote.values() {
            by_fingerprint
                .entry(entry.fingerprint.clone())
                .or_insert_with(|| entry.remote_id.clone());
            if let Some(key) = &entry.key {
                by_key
                    .entry(key.clone())
                    .or_insert_with(|| entry.remote_id.clone());
            }
        }
        Self {
            by_remote,
            by_fingerprint,
            by_key,
        }
    }

    pub fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&IdentityEntry> {
        self.by_fingerprint
            .get(fingerprint)
            .and_then(|id| self.by_remote.get(id))
    }

    pub fn by_key(&self, key: &RecordKey) -> Option<&IdentityEntry> {
        self.by_key.get(key).and_then(|id| self.by_remote.get(id))
    }

    pub fn by_remote_id(&self, id: &RemoteId) -> Option<&IdentityEntry> {
        self.by_remote.get(id)
    }

    /// Entries ordered by remote id.
    pub fn entries(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.by_remote.values()
    }

    pub fn len(&self) -> usize {
        self.by_remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_remote.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

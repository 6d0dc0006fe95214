//! Decision algorithm: what happens to each local record and which
//! identity entries are deleted.
//!
//! [`build`] is pure: it reads the identity index and the remote listing and
//! never performs I/O, so a dry run and a real run always agree on the plan.
//!
//! Per record, in input order:
//!
//! 1. Fingerprint seen earlier in this run → [`Decision::Duplicate`].
//! 2. Entry with the same fingerprint, remote record present → `Unchanged`,
//!    or `Rekey` when the entry's stored key differs from the record's.
//! 3. Same, remote record missing (orphan) → `Create`, replacing the entry.
//! 4. Entry with the same record key, different fingerprint, remote record
//!    present → `Update`; remote record missing → `Create`, replacing it.
//! 5. Otherwise → `Create`.
//!
//! A remote id is claimed by at most one record per run, and a key by at most
//! one record; later contenders fall through to a plain create.
//!
//! Entries whose remote id was not claimed become [`DeleteCandidate`]s. That
//! includes extra entries sharing the fingerprint of a claimed one.

use std::collections::HashSet;

use roster_core::{Fingerprint, IdentityEntry, LogicalRecord, RecordKey, RemoteId};

use crate::fingerprint::fingerprint;
use crate::identity_store::IdentityIndex;
use crate::remote::RemoteListing;

/// Resolution of one local record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Content already present remotely; nothing to do.
    Unchanged { remote_id: RemoteId },
    /// Content already present remotely, but the entry carries another key
    /// (or none). Only the store entry is rewritten.
    Rekey { remote_id: RemoteId },
    /// Same content as an earlier record in this run.
    Duplicate,
    /// Materialize remotely. `replaces` names a stale entry to drop once the
    /// create succeeds.
    Create { replaces: Option<RemoteId> },
    /// Overwrite an existing remote record with new content.
    Update { remote_id: RemoteId },
}

/// A local record with its fingerprint and decision.
#[derive(Debug, Clone)]
pub struct PlannedRecord {
    pub record: LogicalRecord,
    pub fingerprint: Fingerprint,
    pub decision: Decision,
}

/// An identity entry no local record accounts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCandidate {
    pub entry: IdentityEntry,
    /// Whether the remote record still exists. Absent ones only need their
    /// entry pruned.
    pub present_remotely: bool,
}

/// Full decision set for one run.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub records: Vec<PlannedRecord>,
    pub deletes: Vec<DeleteCandidate>,
    /// Distinct fingerprints observed this run.
    pub observed: HashSet<Fingerprint>,
}

/// Counts per decision kind, for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub unchanged: usize,
    pub duplicates: usize,
    pub creates: usize,
    pub recreates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub prunes: usize,
}

impl Plan {
    pub fn summary(&self) -> PlanSummary {
        let mut s = PlanSummary::default();
        for item in &self.records {
            match &item.decision {
                Decision::Unchanged { .. } | Decision::Rekey { .. } => s.unchanged += 1,
                Decision::Duplicate => s.duplicates += 1,
                Decision::Create { replaces: None } => s.creates += 1,
                Decision::Create { replaces: Some(_) } => s.recreates += 1,
                Decision::Update { .. } => s.updates += 1,
            }
        }
        for candidate in &self.deletes {
            if candidate.present_remotely {
                s.deletes += 1;
            } else {
                s.prunes += 1;
            }
        }
        s
    }

    /// True when the plan performs no remote mutation and no store change.
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty()
            && self.records.iter().all(|r| {
                matches!(
                    r.decision,
                    Decision::Unchanged { .. } | Decision::Duplicate
                )
            })
    }
}

/// Compute the plan for `records` against a store snapshot and the listing.
pub fn build(
    records: impl IntoIterator<Item = LogicalRecord>,
    index: &IdentityIndex,
    listing: &RemoteListing,
) -> Plan {
    let mut observed: HashSet<Fingerprint> = HashSet::new();
    let mut claimed_ids: HashSet<RemoteId> = HashSet::new();
    let mut claimed_keys: HashSet<RecordKey> = HashSet::new();
    let mut planned = Vec::new();

    for record in records {
        let fp = fingerprint(&record);
        let decision = if !observed.insert(fp.clone()) {
            Decision::Duplicate
        } else {
            let key_is_free = match record.key() {
                Some(key) => claimed_keys.insert(key.clone()),
                None => false,
            };
            decide(&record, &fp, key_is_free, index, listing, &mut claimed_ids)
        };
        planned.push(PlannedRecord {
            record,
            fingerprint: fp,
            decision,
        });
    }

    let deletes = index
        .entries()
        .filter(|e| !claimed_ids.contains(&e.remote_id))
        .map(|e| DeleteCandidate {
            entry: e.clone(),
            present_remotely: listing.contains(&e.remote_id),
        })
        .collect();

    Plan {
        records: planned,
        deletes,
        observed,
    }
}

fn decide(
    record: &LogicalRecord,
    fp: &Fingerprint,
    key_is_free: bool,
    index: &IdentityIndex,
    listing: &RemoteListing,
    claimed_ids: &mut HashSet<RemoteId>,
) -> Decision {
    if let Some(entry) = index.by_fingerprint(fp) {
        if !claimed_ids.insert(entry.remote_id.clone()) {
            return Decision::Create { replaces: None };
        }
        if !listing.contains(&entry.remote_id) {
            return Decision::Create {
                replaces: Some(entry.remote_id.clone()),
            };
        }
        let remote_id = entry.remote_id.clone();
        // A key already taken by an earlier record this run is not written.
        let key_writable = record.key().is_none() || key_is_free;
        return if entry.key.as_ref() != record.key() && key_writable {
            Decision::Rekey { remote_id }
        } else {
            Decision::Unchanged { remote_id }
        };
    }

    if key_is_free {
        if let Some(entry) = record.key().and_then(|k| index.by_key(k)) {
            if claimed_ids.insert(entry.remote_id.clone()) {
                return if listing.contains(&entry.remote_id) {
                    Decision::Update {
                        remote_id: entry.remote_id.clone(),
                    }
                } else {
                    Decision::Create {
                        replaces: Some(entry.remote_id.clone()),
                    }
                };
            }
        }
    }

    Decision::Create { replaces: None }
}

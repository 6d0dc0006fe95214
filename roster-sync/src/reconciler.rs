//! Reconciler: one run-to-completion pass.
//!
//! ## Run protocol
//!
//! 1. Resolve the target collection.                       (fatal on error)
//! 2. Pull the complete remote id listing.                 (fatal on error)
//! 3. Load the identity store.                             (fatal on error)
//! 4. Build the [`Plan`](crate::plan::Plan).
//! 5. Apply decisions in input order: creates through the batch dispatcher,
//!    updates immediately.
//! 6. Flush the remaining batch.
//! 7. Delete (or prune) every delete candidate.
//! 8. Stamp the store with the completion time.
//!
//! Steps 1–3 happen before any mutation. From step 5 on, a failing remote
//! call is recorded in the [`RunReport`] and the run continues; only identity
//! store write failures abort.

use std::fmt;

use chrono::Utc;

use roster_core::{CollectionId, Config, IdentityEntry, LogicalRecord};

use crate::batch::{BatchDispatcher, DispatchTarget, FlushOutcome, PendingCreate};
use crate::error::SyncError;
use crate::identity_store::{IdentityIndex, IdentityStore};
use crate::plan::{self, Decision, Plan};
use crate::remote::{RemoteDirectory, RemoteError, RemoteListing};

/// Knobs for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Display name of the target collection.
    pub collection: String,
    pub batch_size: usize,
    /// Let the delete phase run even when no local record was read, or when
    /// a configured source was missing.
    pub allow_empty_dataset: bool,
    /// Some configured source contributed nothing because it was missing.
    pub incomplete_dataset: bool,
}

impl From<&Config> for RunOptions {
    fn from(config: &Config) -> Self {
        Self {
            collection: config.collection.clone(),
            batch_size: config.effective_batch_size(),
            allow_empty_dataset: config.allow_empty_dataset,
            incomplete_dataset: false,
        }
    }
}

/// Remote operation kinds, for failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// A per-record failure. The record is retried on the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub label: String,
    pub operation: Operation,
    pub detail: String,
}

/// Counts and failures of an applied run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub collection: CollectionId,
    /// Local records seen, duplicates included.
    pub records: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    pub deleted: usize,
    /// Entries dropped because their remote record was already gone.
    pub pruned: usize,
    pub batches: usize,
    pub failures: Vec<RecordFailure>,
    /// The empty-dataset guard suppressed the delete phase.
    pub deletes_skipped: bool,
}

impl RunReport {
    fn new(collection: CollectionId) -> Self {
        Self {
            collection,
            records: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            duplicates: 0,
            deleted: 0,
            pruned: 0,
            batches: 0,
            failures: Vec::new(),
            deletes_skipped: false,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Total remote mutations performed.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn absorb(&mut self, outcome: FlushOutcome) {
        self.batches += outcome.batches;
        self.created += outcome.created.len();
        self.failures
            .extend(outcome.failed.into_iter().map(|f| RecordFailure {
                label: f.label,
                operation: Operation::Create,
                detail: f.detail,
            }));
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} duplicate, {} removed, {} pruned, {} failed",
            self.created,
            self.updated,
            self.unchanged,
            self.duplicates,
            self.deleted,
            self.pruned,
            self.failed()
        )
    }
}

/// A plan bound to the collection and store state it was computed against.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub collection: CollectionId,
    pub plan: Plan,
    /// Identity entries at load time.
    pub store_entries: usize,
    /// Remote records at listing time.
    pub remote_records: usize,
}

impl PreparedRun {
    /// Whether the empty-dataset guard will hold back the delete phase: no
    /// local record was read, or a source was missing, while the store still
    /// tracks records.
    pub fn deletes_guarded(&self, options: &RunOptions) -> bool {
        let partial = self.plan.observed.is_empty() || options.incomplete_dataset;
        partial && self.store_entries > 0 && !options.allow_empty_dataset
    }
}

/// Drives one run against a remote directory and an identity store, both
/// exclusively borrowed for the duration of the run.
pub struct Reconciler<'a, R: ?Sized, S: ?Sized> {
    remote: &'a mut R,
    store: &'a mut S,
    options: RunOptions,
}

impl<'a, R, S> Reconciler<'a, R, S>
where
    R: RemoteDirectory + ?Sized,
    S: IdentityStore + ?Sized,
{
    pub fn new(remote: &'a mut R, store: &'a mut S, options: RunOptions) -> Self {
        Self {
            remote,
            store,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Steps 1–4: everything up to the plan, without mutating anything.
    pub fn prepare(
        &mut self,
        records: impl IntoIterator<Item = LogicalRecord>,
    ) -> Result<PreparedRun, SyncError> {
        let collection = self.remote.resolve_collection(&self.options.collection)?;
        tracing::debug!(
            "resolved collection '{}' to {}",
            self.options.collection,
            collection
        );

        let listing: RemoteListing = self.remote.list_ids(&collection)?.into_iter().collect();
        tracing::info!("{} records in remote collection", listing.len());

        let entries = self.store.load_all()?;
        let index = IdentityIndex::new(entries);
        tracing::info!("{} entries in identity store", index.len());

        let plan = plan::build(records, &index, &listing);
        Ok(PreparedRun {
            collection,
            plan,
            store_entries: index.len(),
            remote_records: listing.len(),
        })
    }

    /// A full pass: prepare, then apply.
    pub fn run(
        &mut self,
        records: impl IntoIterator<Item = LogicalRecord>,
    ) -> Result<RunReport, SyncError> {
        let prepared = self.prepare(records)?;
        self.execute(prepared)
    }

    /// Steps 5–8 for an already prepared plan.
    pub fn execute(&mut self, prepared: PreparedRun) -> Result<RunReport, SyncError> {
        let guarded = prepared.deletes_guarded(&self.options);
        let PreparedRun {
            collection, plan, ..
        } = prepared;
        let mut report = RunReport::new(collection.clone());
        report.records = plan.records.len();
        let mut dispatcher = BatchDispatcher::new(self.options.batch_size);

        for item in plan.records {
            match item.decision {
                Decision::Unchanged { .. } => {
                    tracing::debug!(
                        "contact {} already exists and has no changes",
                        item.record.label()
                    );
                    report.unchanged += 1;
                }
                Decision::Rekey { remote_id } => {
                    self.store.upsert(&IdentityEntry::new(
                        remote_id,
                        item.fingerprint,
                        item.record.key().cloned(),
                    ))?;
                    tracing::debug!(
                        "contact {} unchanged, stored key refreshed",
                        item.record.label()
                    );
                    report.unchanged += 1;
                }
                Decision::Duplicate => {
                    tracing::debug!(
                        "contact {} duplicates an earlier record ({})",
                        item.record.label(),
                        item.fingerprint.short()
                    );
                    report.duplicates += 1;
                }
                Decision::Create { replaces } => {
                    if let Some(old) = &replaces {
                        tracing::info!(
                            "contact {} missing remotely ({}), recreating",
                            item.record.label(),
                            old
                        );
                    }
                    let mut target = DispatchTarget {
                        remote: &mut *self.remote,
                        store: &mut *self.store,
                        collection: &collection,
                    };
                    let outcome = dispatcher.add(
                        PendingCreate {
                            record: item.record,
                            fingerprint: item.fingerprint,
                            replaces,
                        },
                        &mut target,
                    )?;
                    report.absorb(outcome);
                }
                Decision::Update { remote_id } => {
                    let label = item.record.label();
                    match self.remote.update(&collection, &remote_id, &item.record) {
                        Ok(()) => {
                            self.store.upsert(&IdentityEntry::new(
                                remote_id,
                                item.fingerprint,
                                item.record.key().cloned(),
                            ))?;
                            tracing::info!("contact {} successfully updated", label);
                            report.updated += 1;
                        }
                        Err(err) => {
                            tracing::error!("error updating contact {}: {}", label, err);
                            report.failures.push(RecordFailure {
                                label,
                                operation: Operation::Update,
                                detail: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let mut target = DispatchTarget {
            remote: &mut *self.remote,
            store: &mut *self.store,
            collection: &collection,
        };
        let outcome = dispatcher.flush(&mut target)?;
        report.absorb(outcome);

        if guarded {
            tracing::warn!(
                "local data incomplete; skipping removal of {} tracked records",
                plan.deletes.len()
            );
            report.deletes_skipped = true;
        } else {
            for candidate in plan.deletes {
                let id = candidate.entry.remote_id;
                if !candidate.present_remotely {
                    self.store.remove(std::slice::from_ref(&id))?;
                    tracing::info!("contact {} already gone remotely, entry pruned", id);
                    report.pruned += 1;
                    continue;
                }
                match self.remote.delete(&collection, &id) {
                    Ok(()) | Err(RemoteError::NotFound) => {
                        self.store.remove(std::slice::from_ref(&id))?;
                        tracing::info!("contact with id {} removed", id);
                        report.deleted += 1;
                    }
                    Err(err) => {
                        tracing::error!("error trying to remove contact {}: {}", id, err);
                        report.failures.push(RecordFailure {
                            label: id.to_string(),
                            operation: Operation::Delete,
                            detail: err.to_string(),
                        });
                    }
                }
            }
        }

        self.store.record_run(Utc::now())?;
        tracing::info!("sync of '{}' finished: {}", self.options.collection, report);
        Ok(report)
    }
}

//! Batch dispatcher: groups creates into bounded batch submissions.
//!
//! Results come back positionally: result `i` belongs to queued create `i`.
//! A successful result writes an identity entry; a failed one is only logged,
//! so the record is still unobserved in the store and is created again on the
//! next run. The queue is cleared after every flush, failed items included.

use roster_core::{CollectionId, Fingerprint, IdentityEntry, LogicalRecord, RemoteId};

use crate::error::SyncError;
use crate::identity_store::IdentityStore;
use crate::remote::RemoteDirectory;

/// A create waiting for the next flush.
#[derive(Debug, Clone)]
pub struct PendingCreate {
    pub record: LogicalRecord,
    pub fingerprint: Fingerprint,
    /// Stale entry (orphan) to remove once the create succeeds.
    pub replaces: Option<RemoteId>,
}

/// Where a flush goes: the remote collection and the store receiving ids.
pub struct DispatchTarget<'a, R: ?Sized, S: ?Sized> {
    pub remote: &'a mut R,
    pub store: &'a mut S,
    pub collection: &'a CollectionId,
}

/// A record the remote side accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub label: String,
    pub remote_id: RemoteId,
}

/// A record the remote side rejected, or whose result was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCreate {
    pub label: String,
    pub detail: String,
}

/// Outcome of one or more flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub batches: usize,
    pub created: Vec<Created>,
    pub failed: Vec<FailedCreate>,
}

impl FlushOutcome {
    pub fn merge(&mut self, other: FlushOutcome) {
        self.batches += other.batches;
        self.created.extend(other.created);
        self.failed.extend(other.failed);
    }
}

/// Accumulates creates and submits them `capacity` at a time.
#[derive(Debug)]
pub struct BatchDispatcher {
    capacity: usize,
    queue: Vec<PendingCreate>,
}

impl BatchDispatcher {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue a create; flushes once the queue reaches capacity.
    pub fn add<R, S>(
        &mut self,
        pending: PendingCreate,
        target: &mut DispatchTarget<'_, R, S>,
    ) -> Result<FlushOutcome, SyncError>
    where
        R: RemoteDirectory + ?Sized,
        S: IdentityStore + ?Sized,
    {
        self.queue.push(pending);
        if self.queue.len() >= self.capacity {
            return self.flush(target);
        }
        Ok(FlushOutcome::default())
    }

    /// Submit everything queued as one batch and apply the results.
    ///
    /// Only identity store write failures are returned as errors; remote
    /// failures end up in [`FlushOutcome::failed`].
    pub fn flush<R, S>(
        &mut self,
        target: &mut DispatchTarget<'_, R, S>,
    ) -> Result<FlushOutcome, SyncError>
    where
        R: RemoteDirectory + ?Sized,
        S: IdentityStore + ?Sized,
    {
        let mut outcome = FlushOutcome::default();
        if self.queue.is_empty() {
            return Ok(outcome);
        }
        let pending = std::mem::take(&mut self.queue);
        outcome.batches = 1;

        let records: Vec<&LogicalRecord> = pending.iter().map(|p| &p.record).collect();
        let results = match target.remote.submit_batch(target.collection, &records) {
            Ok(results) => results,
            Err(err) => {
                tracing::error!("batch of {} creates failed: {}", pending.len(), err);
                outcome.failed = pending
                    .iter()
                    .map(|p| FailedCreate {
                        label: p.record.label(),
                        detail: err.to_string(),
                    })
                    .collect();
                return Ok(outcome);
            }
        };
        if results.len() != pending.len() {
            tracing::warn!(
                "batch returned {} results for {} operations",
                results.len(),
                pending.len()
            );
        }

        let mut entries = Vec::new();
        let mut stale = Vec::new();
        for (i, item) in pending.iter().enumerate() {
            let label = item.record.label();
            let result = match results.get(i) {
                Some(result) => result,
                None => {
                    tracing::error!("error adding contact {}: no result returned", label);
                    outcome.failed.push(FailedCreate {
                        label,
                        detail: "no result returned for operation".to_string(),
                    });
                    continue;
                }
            };
            if !result.is_success() {
                let message = result.error_message();
                tracing::error!(
                    "error adding contact {}. Status: {}, Error: {}",
                    label,
                    result.status,
                    message
                );
                outcome.failed.push(FailedCreate {
                    label,
                    detail: format!("HTTP {}: {}", result.status, message),
                });
                continue;
            }
            let Some(remote_id) = result.remote_id() else {
                tracing::error!("contact {} created but response carried no id", label);
                outcome.failed.push(FailedCreate {
                    label,
                    detail: "response without id".to_string(),
                });
                continue;
            };

            entries.push(IdentityEntry::new(
                remote_id.clone(),
                item.fingerprint.clone(),
                item.record.key().cloned(),
            ));
            if let Some(old) = &item.replaces {
                if *old != remote_id {
                    stale.push(old.clone());
                }
            }
            tracing::info!("contact {} successfully added", label);
            outcome.created.push(Created { label, remote_id });
        }

        target.store.upsert_many(&entries)?;
        if !stale.is_empty() {
            target.store.remove(&stale)?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity_store::MemoryIdentityStore;
    use crate::remote::{BatchItemResult, RemoteError};
    use crate::fingerprint::fingerprint;
    use rstest::rstest;
    use serde_json::json;

    /// Accepts every create unless its name is in `reject`; counts batches.
    #[derive(Default)]
    struct Sink {
        batches: Vec<usize>,
        reject: Vec<String>,
        next: usize,
    }

    impl RemoteDirectory for Sink {
        fn resolve_collection(&mut self, name: &str) -> Result<CollectionId, RemoteError> {
            Ok(CollectionId::from(name))
        }

        fn list_ids(&mut self, _c: &CollectionId) -> Result<Vec<RemoteId>, RemoteError> {
            Ok(Vec::new())
        }

        fn create(&mut self, _c: &CollectionId, _r: &LogicalRecord) -> Result<RemoteId, RemoteError> {
            unreachable!("creates go through batches")
        }

        fn update(
            &mut self,
            _c: &CollectionId,
            _id: &RemoteId,
            _r: &LogicalRecord,
        ) -> Result<(), RemoteError> {
            unreachable!()
        }

        fn delete(&mut self, _c: &CollectionId, _id: &RemoteId) -> Result<(), RemoteError> {
            unreachable!()
        }

        fn submit_batch(
            &mut self,
            _c: &CollectionId,
            records: &[&LogicalRecord],
        ) -> Result<Vec<BatchItemResult>, RemoteError> {
            self.batches.push(records.len());
            let mut results = Vec::new();
            for record in records {
                if self.reject.iter().any(|r| Some(r.as_str()) == record.display_name()) {
                    results.push(BatchItemResult {
                        status: 400,
                        body: json!({ "error": { "message": "rejected" } }),
                    });
                } else {
                    self.next += 1;
                    results.push(BatchItemResult {
                        status: 201,
                        body: json!({ "id": format!("r{}", self.next) }),
                    });
                }
            }
            Ok(results)
        }
    }

    fn pending(name: &str) -> PendingCreate {
        let record: LogicalRecord = [("displayName", json!(name))].into_iter().collect();
        PendingCreate {
            fingerprint: fingerprint(&record),
            record,
            replaces: None,
        }
    }

    fn dispatch(
        capacity: usize,
        count: usize,
        sink: &mut Sink,
        store: &mut MemoryIdentityStore,
    ) -> FlushOutcome {
        let collection = CollectionId::from("f");
        let mut target = DispatchTarget {
            remote: sink,
            store,
            collection: &collection,
        };
        let mut dispatcher = BatchDispatcher::new(capacity);
        let mut outcome = FlushOutcome::default();
        for i in 0..count {
            outcome.merge(dispatcher.add(pending(&format!("c{i}")), &mut target).unwrap());
        }
        outcome.merge(dispatcher.flush(&mut target).unwrap());
        assert!(dispatcher.is_empty());
        outcome
    }

    #[rstest]
    #[case(20, 20, vec![20])]
    #[case(20, 21, vec![20, 1])]
    #[case(3, 7, vec![3, 3, 1])]
    #[case(0, 2, vec![1, 1])]
    #[case(5, 0, vec![])]
    fn batches_never_exceed_capacity(
        #[case] capacity: usize,
        #[case] count: usize,
        #[case] expected: Vec<usize>,
    ) {
        let mut sink = Sink::default();
        let mut store = MemoryIdentityStore::new();
        let outcome = dispatch(capacity, count, &mut sink, &mut store);
        assert_eq!(sink.batches, expected);
        assert_eq!(outcome.batches, expected.len());
        assert_eq!(store.len(), count);
    }

    #[test]
    fn rejected_item_is_dropped_and_others_are_stored() {
        let mut sink = Sink {
            reject: vec!["c1".to_string()],
            ..Sink::default()
        };
        let mut store = MemoryIdentityStore::new();
        let outcome = dispatch(20, 3, &mut sink, &mut store);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].label, "c1");
        assert_eq!(outcome.failed[0].detail, "HTTP 400: rejected");
        assert_eq!(store.len(), 2);
        assert!(store.get(&RemoteId::from("r2")).is_some());
    }

    #[test]
    fn successful_replacement_drops_stale_entry() {
        let mut sink = Sink::default();
        let stale = IdentityEntry::new(RemoteId::from("old"), Fingerprint::from("x"), None);
        let mut store = MemoryIdentityStore::with_entries(vec![stale]);
        let collection = CollectionId::from("f");
        let mut target = DispatchTarget {
            remote: &mut sink,
            store: &mut store,
            collection: &collection,
        };
        let mut dispatcher = BatchDispatcher::new(20);
        let mut create = pending("a");
        create.replaces = Some(RemoteId::from("old"));
        dispatcher.add(create, &mut target).unwrap();
        dispatcher.flush(&mut target).unwrap();

        assert!(store.get(&RemoteId::from("old")).is_none());
        assert!(store.get(&RemoteId::from("r1")).is_some());
    }
}

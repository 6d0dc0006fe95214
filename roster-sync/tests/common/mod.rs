//! In-memory remote directory that records every call.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};

use roster_core::{CollectionId, LogicalRecord, RemoteId};
use roster_sync::{BatchItemResult, RemoteDirectory, RemoteError};
use serde_json::json;

pub const FOLDER: &str = "company contacts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve,
    List,
    Create(String),
    Update(RemoteId),
    Delete(RemoteId),
    Batch(usize),
}

#[derive(Debug, Default)]
pub struct FakeDirectory {
    pub records: BTreeMap<RemoteId, LogicalRecord>,
    pub calls: Vec<Call>,
    next_id: usize,
    /// Display names whose create is rejected with HTTP 400.
    pub reject_creates: HashSet<String>,
    pub fail_updates: HashSet<RemoteId>,
    pub fail_deletes: HashSet<RemoteId>,
    pub fail_listing: bool,
    pub fail_batch_transport: bool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Remove a record behind the engine's back.
    pub fn delete_out_of_band(&mut self, id: &RemoteId) {
        self.records.remove(id);
    }

    pub fn batches(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Batch(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Update(_)))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .count()
    }

    /// Create, update, delete and batch calls.
    pub fn mutations(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::Resolve | Call::List))
            .count()
    }

    pub fn id_of(&self, name: &str) -> Option<RemoteId> {
        self.records
            .iter()
            .find(|(_, r)| r.display_name() == Some(name))
            .map(|(id, _)| id.clone())
    }

    fn insert(&mut self, record: &LogicalRecord) -> RemoteId {
        self.next_id += 1;
        let id = RemoteId(format!("AAMk-{:04}", self.next_id));
        self.records.insert(id.clone(), record.clone());
        id
    }
}

impl RemoteDirectory for FakeDirectory {
    fn resolve_collection(&mut self, name: &str) -> Result<CollectionId, RemoteError> {
        self.calls.push(Call::Resolve);
        if name == FOLDER {
            Ok(CollectionId::from("folder-1"))
        } else {
            Err(RemoteError::CollectionNotFound(name.to_string()))
        }
    }

    fn list_ids(&mut self, _collection: &CollectionId) -> Result<Vec<RemoteId>, RemoteError> {
        self.calls.push(Call::List);
        if self.fail_listing {
            return Err(RemoteError::IncompleteListing("page 2 failed".into()));
        }
        Ok(self.records.keys().cloned().collect())
    }

    fn create(
        &mut self,
        _collection: &CollectionId,
        record: &LogicalRecord,
    ) -> Result<RemoteId, RemoteError> {
        self.calls.push(Call::Create(record.label()));
        Ok(self.insert(record))
    }

    fn update(
        &mut self,
        _collection: &CollectionId,
        id: &RemoteId,
        record: &LogicalRecord,
    ) -> Result<(), RemoteError> {
        self.calls.push(Call::Update(id.clone()));
        if self.fail_updates.contains(id) {
            return Err(RemoteError::Status {
                code: 500,
                message: "update failed".into(),
            });
        }
        match self.records.get_mut(id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(RemoteError::NotFound),
        }
    }

    fn delete(&mut self, _collection: &CollectionId, id: &RemoteId) -> Result<(), RemoteError> {
        self.calls.push(Call::Delete(id.clone()));
        if self.fail_deletes.contains(id) {
            return Err(RemoteError::Status {
                code: 503,
                message: "try later".into(),
            });
        }
        match self.records.remove(id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound),
        }
    }

    fn submit_batch(
        &mut self,
        _collection: &CollectionId,
        records: &[&LogicalRecord],
    ) -> Result<Vec<BatchItemResult>, RemoteError> {
        self.calls.push(Call::Batch(records.len()));
        if self.fail_batch_transport {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let name = record.display_name().unwrap_or_default().to_string();
            if self.reject_creates.contains(&name) {
                results.push(BatchItemResult {
                    status: 400,
                    body: json!({ "error": { "message": "invalid contact" } }),
                });
            } else {
                let id = self.insert(record);
                results.push(BatchItemResult {
                    status: 201,
                    body: json!({ "id": id.0, "displayName": name }),
                });
            }
        }
        Ok(results)
    }
}

pub fn contact(name: &str) -> LogicalRecord {
    [("displayName", json!(name))].into_iter().collect()
}

/// A contact with a stable key derived from its name.
pub fn keyed_contact(name: &str, company: &str) -> LogicalRecord {
    let record: LogicalRecord = [("displayName", json!(name)), ("companyName", json!(company))]
        .into_iter()
        .collect();
    record.with_key(format!("contact:{}", name.to_lowercase()))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

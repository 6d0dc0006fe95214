//! The remote directory seam.
//!
//! The engine never talks HTTP itself; it drives a [`RemoteDirectory`]
//! implementation. `roster-graph` provides the Microsoft Graph one; tests use
//! an in-memory fake.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use roster_core::{CollectionId, LogicalRecord, RemoteId};

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Non-2xx response.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// The addressed record does not exist (HTTP 404).
    #[error("remote record not found")]
    NotFound,

    /// Connection, TLS, DNS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Pagination stopped before the provider signalled the last page.
    #[error("remote listing incomplete: {0}")]
    IncompleteListing(String),

    /// No collection with the configured name exists.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Token acquisition failed.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl RemoteError {
    /// Rate limiting, server-side and transport errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Status { code, .. } => *code == 429 || (500..600).contains(code),
            RemoteError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Result of one operation inside a batch submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResult {
    pub status: u16,
    pub body: Value,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Id of the created record, read from the response body.
    pub fn remote_id(&self) -> Option<RemoteId> {
        self.body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(RemoteId::from)
    }

    /// Provider error message, if the body carries one.
    pub fn error_message(&self) -> String {
        self.body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string()
    }
}

/// Operations the engine needs from the remote directory.
///
/// Every call blocks until the provider answers. Implementations retry
/// transient failures internally if they want to; an `Err` here is final for
/// this run.
pub trait RemoteDirectory {
    /// Resolve the configured collection name to its id.
    fn resolve_collection(&mut self, name: &str) -> Result<CollectionId, RemoteError>;

    /// Every record id currently in `collection`, across all pages.
    fn list_ids(&mut self, collection: &CollectionId) -> Result<Vec<RemoteId>, RemoteError>;

    fn create(
        &mut self,
        collection: &CollectionId,
        record: &LogicalRecord,
    ) -> Result<RemoteId, RemoteError>;

    fn update(
        &mut self,
        collection: &CollectionId,
        id: &RemoteId,
        record: &LogicalRecord,
    ) -> Result<(), RemoteError>;

    fn delete(&mut self, collection: &CollectionId, id: &RemoteId) -> Result<(), RemoteError>;

    /// Submit creates as one request.
    ///
    /// The returned results must be in submission order, one per record.
    fn submit_batch(
        &mut self,
        collection: &CollectionId,
        records: &[&LogicalRecord],
    ) -> Result<Vec<BatchItemResult>, RemoteError>;
}

/// The set of remote ids present at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing(HashSet<RemoteId>);

impl RemoteListing {
    pub fn contains(&self, id: &RemoteId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<RemoteId> for RemoteListing {
    fn from_iter<I: IntoIterator<Item = RemoteId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transient_classification() {
        let throttled = RemoteError::Status {
            code: 429,
            message: "slow down".into(),
        };
        let unavailable = RemoteError::Status {
            code: 503,
            message: "busy".into(),
        };
        let bad_request = RemoteError::Status {
            code: 400,
            message: "bad".into(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(RemoteError::Transport("reset".into()).is_transient());
        assert!(!bad_request.is_transient());
        assert!(!RemoteError::NotFound.is_transient());
    }

    #[test]
    fn batch_result_extracts_id_and_message() {
        let ok = BatchItemResult {
            status: 201,
            body: json!({ "id": "AAMk-1", "displayName": "Ada" }),
        };
        assert!(ok.is_success());
        assert_eq!(ok.remote_id(), Some(RemoteId::from("AAMk-1")));

        let failed = BatchItemResult {
            status: 400,
            body: json!({ "error": { "code": "ErrorInvalidProperty", "message": "bad phone" } }),
        };
        assert!(!failed.is_success());
        assert_eq!(failed.remote_id(), None);
        assert_eq!(failed.error_message(), "bad phone");
    }

    #[test]
    fn listing_membership() {
        let listing: RemoteListing = vec![RemoteId::from("a"), RemoteId::from("b")]
            .into_iter()
            .collect();
        assert_eq!(listing.len(), 2);
        assert!(listing.contains(&RemoteId::from("a")));
        assert!(!listing.contains(&RemoteId::from("c")));
    }
}

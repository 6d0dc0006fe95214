//! Error types for roster-sync.

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::RemoteError;

/// Run-aborting errors.
///
/// Per-record create/update/delete failures are not errors at this level;
/// they are collected in the [`RunReport`](crate::RunReport).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The identity store could not be read. Proceeding would re-create
    /// every record, so the run stops before any mutation.
    #[error("identity store unavailable at {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// An I/O error while persisting the identity store, with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (identity store).
    #[error("identity store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collection lookup or listing failed.
    #[error("remote directory error: {0}")]
    Remote(#[from] RemoteError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

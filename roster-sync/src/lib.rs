//! # roster-sync
//!
//! Reconciliation engine: converges one remote contact collection onto the
//! local dataset.
//!
//! A run resolves the target collection, pulls the full remote id listing,
//! loads the identity store, builds a [`plan::Plan`] from content
//! fingerprints, then applies it: creates through the
//! [`batch::BatchDispatcher`], updates and deletes one at a time. Call
//! [`Reconciler::run`] for a full pass or [`Reconciler::prepare`] for a
//! dry-run plan.

pub mod batch;
pub mod error;
pub mod fingerprint;
pub mod identity_store;
pub mod plan;
pub mod reconciler;
pub mod remote;

pub use error::SyncError;
pub use fingerprint::fingerprint;
pub use identity_store::{IdentityIndex, IdentityStore, JsonIdentityStore, MemoryIdentityStore};
pub use reconciler::{Reconciler, RunOptions, RunReport};
pub use remote::{BatchItemResult, RemoteDirectory, RemoteError, RemoteListing};

//! # roster-graph
//!
//! Microsoft Graph implementation of [`roster_sync::RemoteDirectory`]:
//! contact folders addressed through a shared mailbox, client-credentials
//! tokens, paginated listing, `$batch` creates and bounded retries.

pub mod client;
pub mod error;
pub mod retry;
pub mod token;

pub use client::{build_agent, GraphDirectory};
pub use error::GraphError;
pub use retry::RetryPolicy;
pub use token::{ClientCredentials, StaticToken, TokenSource};

//! Roster core library: domain types, logical records, configuration.
//!
//! - [`types`]: identifier newtypes and [`IdentityEntry`]
//! - [`record`]: [`LogicalRecord`] and value normalization
//! - [`config`]: YAML configuration load / save
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod record;
pub mod types;

pub use config::{AuthConfig, Config, Encoding, RetryConfig, SourceConfig, SourceKind};
pub use error::ConfigError;
pub use record::LogicalRecord;
pub use types::{CollectionId, Fingerprint, IdentityEntry, RecordKey, RemoteId};

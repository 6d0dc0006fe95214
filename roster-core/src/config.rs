//! YAML run configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.roster/
//!   config.yaml                  (mode 0600: holds credentials)
//!   identities/<collection>.json (identity store, see roster-sync)
//! ```
//!
//! # API pattern
//!
//! Path-taking functions (`load_at`, `save_at`, `default_path_at`) are what
//! tests use with a `TempDir`; the no-arg wrappers derive the home directory
//! from `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable that overrides `auth.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "ROSTER_CLIENT_SECRET";

/// Upper bound on operations per batch request accepted by the remote side.
pub const MAX_BATCH_SIZE: usize = 20;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Mailbox (user principal) owning the contact folder.
    pub mailbox: String,
    /// Display name of the target contact folder.
    pub collection: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Identity store location; defaults to `~/.roster/identities/<collection>.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_store: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Permit the delete phase to run when no local record was read.
    #[serde(default)]
    pub allow_empty_dataset: bool,
}

/// One CSV export feeding the local dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub kind: SourceKind,
    #[serde(default)]
    pub encoding: Encoding,
    /// Column holding a stable external key, if the export has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
}

/// Which field mapping applies to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Contact persons export.
    Contacts,
    /// Company addresses export.
    Addresses,
}

/// Text encoding of a CSV export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16le,
}

/// Client-credentials for the directory API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl AuthConfig {
    /// Secret from [`CLIENT_SECRET_ENV`], falling back to the config value.
    pub fn resolve_secret(&self) -> Result<String, ConfigError> {
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            if !secret.is_empty() {
                return Ok(secret);
            }
        }
        self.client_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret {
                var: CLIENT_SECRET_ENV,
            })
    }
}

/// Bounded in-run retry policy for transient transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_graph_base_url() -> String {
    DEFAULT_GRAPH_BASE_URL.to_string()
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

impl Config {
    /// Starter config written by `roster init`.
    pub fn template(mailbox: &str, collection: &str) -> Self {
        Self {
            mailbox: mailbox.to_string(),
            collection: collection.to_string(),
            graph_base_url: default_graph_base_url(),
            batch_size: default_batch_size(),
            identity_store: None,
            sources: vec![
                SourceConfig {
                    path: PathBuf::from("ansprechpartner_exchange_online.csv"),
                    kind: SourceKind::Contacts,
                    encoding: Encoding::Utf16le,
                    key_column: None,
                },
                SourceConfig {
                    path: PathBuf::from("adressen_exchange_online.csv"),
                    kind: SourceKind::Addresses,
                    encoding: Encoding::Utf16le,
                    key_column: None,
                },
            ],
            auth: AuthConfig {
                tenant_id: String::new(),
                client_id: String::new(),
                client_secret: None,
            },
            retry: RetryConfig::default(),
            log_file: None,
            allow_empty_dataset: false,
        }
    }

    /// Batch size clamped to `1..=MAX_BATCH_SIZE`.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Identity store path, resolving the per-collection default under `home`.
    pub fn identity_store_path(&self, home: &Path) -> PathBuf {
        match &self.identity_store {
            Some(path) => path.clone(),
            None => roster_dir_at(home)
                .join("identities")
                .join(format!("{}.json", file_stem_for(&self.collection))),
        }
    }

    /// Reject configs that cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.trim().is_empty() {
            return Err(ConfigError::Invalid("mailbox must not be empty".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("collection must not be empty".into()));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source is required".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Folder names may contain spaces or slashes; keep the file name portable.
fn file_stem_for(collection: &str) -> String {
    collection
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

/// `<home>/.roster/`
pub fn roster_dir_at(home: &Path) -> PathBuf {
    home.join(".roster")
}

/// `<home>/.roster/config.yaml`
pub fn default_path_at(home: &Path) -> PathBuf {
    roster_dir_at(home).join("config.yaml")
}

/// `default_path_at` convenience wrapper.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(default_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load and validate the config at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at(default_path())` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&default_path()?)
}

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

pub mod init;
pub mod purge;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roster_core::{config, Config};

/// A loaded configuration and where it came from.
pub struct Loaded {
    pub config: Config,
    pub path: PathBuf,
    pub home: PathBuf,
}

impl Loaded {
    /// Directory relative paths in the config resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn identity_store_path(&self) -> PathBuf {
        self.resolve(&self.config.identity_store_path(&self.home))
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.config.log_file.as_deref().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }
}

/// `--config` if given, else `~/.roster/config.yaml`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config::default_path().context("could not determine home directory"),
    }
}

pub fn load_config(explicit: Option<&Path>) -> Result<Loaded> {
    let path = config_path(explicit)?;
    let config = config::load_at(&path)
        .with_context(|| format!("failed to load {}; run `roster init` first", path.display()))?;
    let home = config::home().context("could not determine home directory")?;
    Ok(Loaded { config, path, home })
}

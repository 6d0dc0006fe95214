//! `roster init`: write a starter configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use roster_core::{config, Config};

/// Arguments for `roster init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Shared mailbox owning the contact folder.
    #[arg(long)]
    pub mailbox: String,

    /// Display name of the contact folder.
    #[arg(long)]
    pub collection: String,

    #[arg(long)]
    pub tenant_id: Option<String>,

    #[arg(long)]
    pub client_id: Option<String>,

    /// Overwrite an existing configuration.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let path = super::config_path(config_path)?;
        if path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite",
                path.display()
            );
        }

        let mut cfg = Config::template(&self.mailbox, &self.collection);
        cfg.auth.tenant_id = self.tenant_id.unwrap_or_default();
        cfg.auth.client_id = self.client_id.unwrap_or_default();
        cfg.validate().context("invalid configuration")?;
        config::save_at(&path, &cfg)
            .with_context(|| format!("failed to write {}", path.display()))?;

        println!("✓ wrote {}", path.display());
        println!(
            "  Edit the source paths, then set {} and run `roster sync --dry-run`.",
            config::CLIENT_SECRET_ENV
        );
        Ok(())
    }
}

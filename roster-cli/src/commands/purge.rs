//! `roster purge`: empty the contact folder and forget every identity.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use roster_core::RemoteId;
use roster_graph::GraphDirectory;
use roster_sync::{IdentityStore, JsonIdentityStore, RemoteDirectory, RemoteError};

use crate::logging;

/// Arguments for `roster purge`.
#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Confirm deletion of every contact in the folder.
    #[arg(long)]
    pub yes: bool,
}

impl PurgeArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        if !self.yes {
            bail!("purge deletes every contact in the folder; pass --yes to confirm");
        }
        let loaded = super::load_config(config_path)?;
        logging::init_tracing(loaded.log_file().as_deref())?;
        let cfg = &loaded.config;

        let mut remote =
            GraphDirectory::from_config(cfg).context("failed to set up the Graph client")?;
        let mut store = JsonIdentityStore::open(loaded.identity_store_path());
        let outcome = purge(&mut remote, &mut store, &cfg.collection)?;

        println!(
            "✓ '{}' purged ({} removed, {} failed)",
            cfg.collection, outcome.removed, outcome.failed
        );
        if outcome.failed > 0 {
            bail!("{} contacts could not be removed", outcome.failed);
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PurgeOutcome {
    removed: usize,
    failed: usize,
}

/// Delete everything in `collection`, dropping store entries as their remote
/// records go. Entries whose delete failed stay in the store.
fn purge<R, S>(remote: &mut R, store: &mut S, collection: &str) -> Result<PurgeOutcome>
where
    R: RemoteDirectory + ?Sized,
    S: IdentityStore + ?Sized,
{
    let folder = remote
        .resolve_collection(collection)
        .with_context(|| format!("failed to resolve '{collection}'"))?;
    let ids = remote
        .list_ids(&folder)
        .context("failed to list the contact folder")?;
    let tracked = store.load_all().context("failed to load identity store")?;
    tracing::info!("found {} contacts in folder {}", ids.len(), folder);

    let mut outcome = PurgeOutcome::default();
    let mut failed_ids = Vec::new();
    for id in &ids {
        match remote.delete(&folder, id) {
            Ok(()) | Err(RemoteError::NotFound) => {
                tracing::info!("contact {} removed", id);
                outcome.removed += 1;
            }
            Err(err) => {
                tracing::error!("failed to remove contact {}: {}", id, err);
                failed_ids.push(id.clone());
                outcome.failed += 1;
            }
        }
    }

    let forget: Vec<RemoteId> = tracked
        .into_iter()
        .map(|e| e.remote_id)
        .filter(|id| !failed_ids.contains(id))
        .collect();
    store
        .remove(&forget)
        .context("failed to update identity store")?;
    Ok(outcome)
}

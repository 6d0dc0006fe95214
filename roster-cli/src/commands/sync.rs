//! `roster sync`: one reconciliation run.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use roster_graph::GraphDirectory;
use roster_sync::{
    plan::Decision, reconciler::PreparedRun, JsonIdentityStore, Reconciler, RunOptions, RunReport,
};

use crate::logging;

/// Arguments for `roster sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Print the plan without creating, updating or deleting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run the delete phase even if the exports yield no records or one is
    /// missing.
    #[arg(long)]
    pub allow_empty: bool,
}

impl SyncArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let loaded = super::load_config(config_path)?;
        logging::init_tracing(loaded.log_file().as_deref())?;
        let cfg = &loaded.config;

        let dataset = roster_source::load_dataset(&cfg.sources, &loaded.base_dir())
            .context("failed to read source exports")?;
        tracing::info!("{} records read from {} sources", dataset.len(), dataset.sources.len());

        let mut options = RunOptions::from(cfg);
        options.allow_empty_dataset |= self.allow_empty;
        options.incomplete_dataset = !dataset.is_complete();
        for path in dataset.missing_sources() {
            tracing::warn!(
                "source {} missing; removals are held back this run",
                path.display()
            );
        }

        let mut remote =
            GraphDirectory::from_config(cfg).context("failed to set up the Graph client")?;
        let mut store = JsonIdentityStore::open(loaded.identity_store_path());
        let mut reconciler = Reconciler::new(&mut remote, &mut store, options.clone());

        if self.dry_run {
            let prepared = reconciler
                .prepare(dataset.records)
                .with_context(|| format!("sync of '{}' failed", cfg.collection))?;
            print_plan(&prepared, &options);
            return Ok(());
        }

        let report = reconciler
            .run(dataset.records)
            .with_context(|| format!("sync of '{}' failed", cfg.collection))?;
        print_report(&cfg.collection, &report);
        if report.failed() > 0 {
            bail!(
                "{} operations failed; they are retried on the next run",
                report.failed()
            );
        }
        Ok(())
    }
}

fn print_plan(prepared: &PreparedRun, options: &RunOptions) {
    let summary = prepared.plan.summary();
    println!(
        "[dry-run] '{}': {} to create, {} to recreate, {} to update, {} unchanged, {} duplicate, {} to remove, {} to prune",
        options.collection,
        summary.creates,
        summary.recreates,
        summary.updates,
        summary.unchanged,
        summary.duplicates,
        summary.deletes,
        summary.prunes,
    );

    for item in &prepared.plan.records {
        let label = item.record.label();
        match &item.decision {
            Decision::Create { replaces: None } => println!("  +  {label}"),
            Decision::Create {
                replaces: Some(old),
            } => println!("  +  {label} (replaces missing {old})"),
            Decision::Update { remote_id } => println!("  ✎  {label} → {remote_id}"),
            Decision::Rekey { .. } => println!("  ~  {label} (stored key refreshed)"),
            Decision::Unchanged { .. } | Decision::Duplicate => {}
        }
    }

    if prepared.deletes_guarded(options) {
        println!(
            "  !  local data incomplete; {} removals held back (use --allow-empty to force)",
            prepared.plan.deletes.len()
        );
        return;
    }
    for candidate in &prepared.plan.deletes {
        let id = &candidate.entry.remote_id;
        if candidate.present_remotely {
            println!("  -  {id}");
        } else {
            println!("  ·  {id} (already gone, entry pruned)");
        }
    }
}

fn print_report(collection: &str, report: &RunReport) {
    if report.mutations() == 0 && report.pruned == 0 && report.failures.is_empty() {
        println!("✓ '{collection}': nothing to do ({} unchanged)", report.unchanged);
    } else {
        println!("✓ '{collection}' synced ({report})");
    }
    if report.deletes_skipped {
        println!("  !  local data incomplete; removals skipped");
    }
    for failure in &report.failures {
        println!(
            "  ✗  {} {}: {}",
            failure.operation, failure.label, failure.detail
        );
    }
}

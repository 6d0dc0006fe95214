//! `roster status`: identity store and source visibility, offline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use roster_core::{Config, SourceKind};
use roster_sync::JsonIdentityStore;

/// Arguments for `roster status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let loaded = super::load_config(config_path)?;
        let report = build_report(
            &loaded.config,
            &loaded.identity_store_path(),
            &loaded.base_dir(),
        )?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    mailbox: String,
    collection: String,
    identity_store: PathBuf,
    last_sync_at: Option<DateTime<Utc>>,
    last_sync_age: String,
    entries: usize,
    keyed_entries: usize,
    sources: Vec<SourceStatus>,
}

#[derive(Debug, Serialize)]
struct SourceStatus {
    path: PathBuf,
    kind: SourceKind,
    present: bool,
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "source")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "file")]
    present: String,
}

fn build_report(config: &Config, store_path: &Path, base_dir: &Path) -> Result<StatusReport> {
    let store = JsonIdentityStore::read_file(store_path)
        .with_context(|| format!("failed to read identity store {}", store_path.display()))?;
    let keyed_entries = store.entries.iter().filter(|e| e.key.is_some()).count();
    let sources = config
        .sources
        .iter()
        .map(|s| {
            let path = if s.path.is_absolute() {
                s.path.clone()
            } else {
                base_dir.join(&s.path)
            };
            SourceStatus {
                present: path.exists(),
                path,
                kind: s.kind,
            }
        })
        .collect();

    Ok(StatusReport {
        mailbox: config.mailbox.clone(),
        collection: config.collection.clone(),
        identity_store: store_path.to_path_buf(),
        last_sync_age: store
            .synced_at
            .map(|at| format_age(Utc::now() - at))
            .unwrap_or_else(|| "never".to_string()),
        last_sync_at: store.synced_at,
        entries: store.entries.len(),
        keyed_entries,
        sources,
    })
}

fn print_table(report: &StatusReport) {
    println!(
        "Roster v{} | {} | '{}'",
        env!("CARGO_PKG_VERSION"),
        report.mailbox,
        report.collection.bold(),
    );
    println!("identity store  {}", report.identity_store.display());
    println!(
        "tracked         {} records ({} keyed)",
        report.entries, report.keyed_entries
    );
    let age = if report.last_sync_at.is_some() {
        report.last_sync_age.green().to_string()
    } else {
        report.last_sync_age.bright_black().to_string()
    };
    println!("last sync       {age}");

    let rows: Vec<SourceRow> = report
        .sources
        .iter()
        .map(|s| SourceRow {
            path: s.path.display().to_string(),
            kind: kind_label(s.kind).to_string(),
            present: if s.present {
                "present".green().to_string()
            } else {
                "missing".red().to_string()
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn kind_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Contacts => "contacts",
        SourceKind::Addresses => "addresses",
    }
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

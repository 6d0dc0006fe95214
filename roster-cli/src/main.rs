//! Roster: keep an Exchange contact folder in step with CSV exports.
//!
//! # Usage
//!
//! ```text
//! roster init --mailbox <address> --collection <folder> [--tenant-id ..] [--client-id ..]
//! roster sync [--dry-run]
//! roster status [--json]
//! roster purge --yes
//! ```
//!
//! Every command accepts `--config <path>`; the default is
//! `~/.roster/config.yaml`.

mod commands;
mod log_rotation;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, purge::PurgeArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "roster",
    version,
    about = "Reconcile CSV contact exports into a remote contact folder",
    long_about = None,
)]
struct Cli {
    /// Configuration file (default: ~/.roster/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration file.
    Init(InitArgs),

    /// Reconcile the configured exports into the contact folder.
    Sync(SyncArgs),

    /// Show the identity store and source files without contacting the server.
    Status(StatusArgs),

    /// Delete every contact in the folder and clear the identity store.
    Purge(PurgeArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init(args) => args.run(config),
        Commands::Sync(args) => args.run(config),
        Commands::Status(args) => args.run(config),
        Commands::Purge(args) => args.run(config),
    }
}

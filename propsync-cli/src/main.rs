//! propsync: Nacos configuration snapshots for load-test jobs.
//!
//! # Usage
//!
//! ```text
//! propsync init [--force] [--host <host>] [--port <port>] [--layout hierarchical|flattened]
//! propsync entries [--stage <stage> [--debug]] [--json]
//! propsync resolve --stage <stage> --device <id>... [--debug] [--out <file>] [--merged] [--echo]
//! propsync fetch --stage <stage> --device <id>... [--debug] [--dest <dir>] [--json]
//! propsync collect <job-name> --out <dir> [--json]
//! propsync summary [--dry-run]
//! propsync snapshot [--no-clean]
//! propsync daemon sync|reconcile|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    collect::CollectArgs, daemon::DaemonCommand, entries::EntriesArgs, fetch::FetchArgs,
    init::InitArgs, resolve::ResolveArgs, snapshot::SnapshotArgs, summary::SummaryArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "propsync",
    version,
    about = "Resolve, collect and mirror Nacos configuration for load-test jobs",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default ~/.propsync/config.yaml.
    Init(InitArgs),

    /// List the entries of the local mirror.
    Entries(EntriesArgs),

    /// Resolve a rule against the mirror and write the bundle.
    Resolve(ResolveArgs),

    /// Resolve a rule against the live authority.
    Fetch(FetchArgs),

    /// Prepare one properties file per test plan of a CI job.
    Collect(CollectArgs),

    /// Regenerate the per-stage summaries inside the mirror.
    Summary(SummaryArgs),

    /// Refresh the mirror from the authority.
    Snapshot(SnapshotArgs),

    /// Run the long-lived daemons or read their logs.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Entries(args) => args.run(),
        Commands::Resolve(args) => args.run(),
        Commands::Fetch(args) => args.run(),
        Commands::Collect(args) => args.run(),
        Commands::Summary(args) => args.run(),
        Commands::Snapshot(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

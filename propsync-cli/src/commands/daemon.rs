//! `propsync daemon`: foreground sync engine, reconciliation loop, and logs.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use propsync_daemon::paths::{commit_log_path, reconcile_log_path, sync_log_path};
use propsync_daemon::{start_reconcile_blocking, start_sync_blocking};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Watch the trigger entry and keep the git mirror in sync.
    Sync,
    /// Periodically compare reference tables with their snapshots.
    Reconcile,
    /// Tail a daemon log or the commit history.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// How many trailing lines to print.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show the reconciliation log instead of the sync log.
    #[arg(long, conflicts_with = "history")]
    pub reconcile: bool,

    /// Show the commit history of the sync engine.
    #[arg(long)]
    pub history: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        DaemonCommand::Sync => {
            start_sync_blocking(&home).context("sync daemon exited with error")?;
        }
        DaemonCommand::Reconcile => {
            start_reconcile_blocking(&home).context("reconcile daemon exited with error")?;
        }
        DaemonCommand::Logs(args) => {
            let path = if args.history {
                commit_log_path(&home)
            } else if args.reconcile {
                reconcile_log_path(&home)
            } else {
                sync_log_path(&home)
            };
            print_tail(&path, args.lines)
                .with_context(|| format!("failed to read {}", path.display()))?;
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    match tail(path, lines)? {
        None => println!("log file not found: {}", path.display()),
        Some(tail) => {
            println!("==> {} <==", path.display());
            tail.iter().for_each(|line| println!("{line}"));
        }
    }
    Ok(())
}

/// Last `n` lines of `path`, or `None` when the file does not exist yet.
fn tail(path: &Path, n: usize) -> Result<Option<VecDeque<String>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("open {}", path.display())),
    };

    let mut kept = VecDeque::with_capacity(n);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            continue;
        }
        if kept.len() == n {
            kept.pop_front();
        }
        kept.push_back(line);
    }
    Ok(Some(kept))
}

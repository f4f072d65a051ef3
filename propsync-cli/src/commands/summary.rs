//! `propsync summary [--dry-run]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use propsync_snapshot::{refresh_summaries, WriteResult};

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Report what would change without touching the mirror.
    #[arg(long)]
    pub dry_run: bool,
}

impl SummaryArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let index = super::open_mirror(&home, &settings)?;

        let installed = refresh_summaries(index.as_ref(), settings.mirror.encoding, self.dry_run)
            .context("failed to regenerate stage summaries")?;

        let mut changed = 0;
        for summary in &installed {
            let marker = match summary.write {
                WriteResult::Written { .. } => "written".green(),
                WriteResult::WouldWrite { .. } => "would write".yellow(),
                WriteResult::Unchanged { .. } => "unchanged".dimmed(),
            };
            if !matches!(summary.write, WriteResult::Unchanged { .. }) {
                changed += 1;
            }
            println!("  {:<40} {marker}", summary.key.to_string());
        }
        println!("{changed} of {} summar{} changed", installed.len(), if installed.len() == 1 { "y" } else { "ies" });
        Ok(())
    }
}

//! `propsync resolve`: rule against the local mirror.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use propsync_snapshot::{concatenate, properties, resolve};

use super::RuleArgs;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub rule: RuleArgs,

    /// Output file (default ./all.properties).
    #[arg(long, short = 'o', default_value = "all.properties")]
    pub out: PathBuf,

    /// Write one merged key=value set instead of the sectioned document.
    #[arg(long)]
    pub merged: bool,

    /// Also print the written document to stdout.
    #[arg(long)]
    pub echo: bool,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let rule = self.rule.rule()?;
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let index = super::open_mirror(&home, &settings)?;

        let bundle = resolve(&rule, index.as_ref());
        if bundle.is_empty() {
            eprintln!(
                "{}",
                format!("no entry of stage {} is present in the mirror", self.rule.stage).yellow()
            );
        }
        for entry in &bundle.entries {
            println!("  {} {}", "+".green(), entry.key);
        }

        if self.merged {
            let merged = properties::merge_bundle(&bundle.paths())?;
            let text = properties::to_text(&merged);
            if let Some(parent) = self.out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&self.out, &text)
                .with_context(|| format!("failed to write {}", self.out.display()))?;
            if self.echo {
                print!("{text}");
            }
            println!("✓ {} key(s) -> {}", merged.len(), self.out.display());
            return Ok(());
        }

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let echo: Option<&mut dyn Write> = if self.echo { Some(&mut lock) } else { None };
        let bytes = concatenate(&bundle.paths(), &self.out, echo)?;
        drop(lock);
        println!(
            "✓ {} file(s), {bytes} byte(s) -> {}",
            bundle.len(),
            self.out.display()
        );
        Ok(())
    }
}

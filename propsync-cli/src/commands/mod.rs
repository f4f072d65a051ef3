pub mod collect;
pub mod daemon;
pub mod entries;
pub mod fetch;
pub mod init;
pub mod resolve;
pub mod snapshot;
pub mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use propsync_core::{build_rule, settings, Rule, Settings};
use propsync_snapshot::{open_index, SnapshotIndex};

/// Rule selection shared by `resolve` and `fetch`.
#[derive(Args, Debug)]
pub struct RuleArgs {
    /// ci | testonline | predeploy | production
    #[arg(long, short = 's')]
    pub stage: String,

    /// Device identifier (repeatable).
    #[arg(long = "device", short = 'd', value_name = "ID")]
    pub devices: Vec<String>,

    /// Include the DEBUG group.
    #[arg(long)]
    pub debug: bool,
}

impl RuleArgs {
    pub fn rule(&self) -> Result<Rule> {
        build_rule(&self.stage, self.devices.iter().cloned(), self.debug)
            .with_context(|| format!("invalid rule for stage '{}'", self.stage))
    }
}

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub fn load_settings(home: &Path) -> Result<Settings> {
    settings::load_at(home).with_context(|| {
        format!(
            "failed to load {}",
            settings::config_path_at(home).display()
        )
    })
}

/// Open the mirror configured in `settings`.
pub fn open_mirror(home: &Path, settings: &Settings) -> Result<Box<dyn SnapshotIndex>> {
    let dir = settings.mirror_dir_at(home);
    open_index(settings.mirror.layout, &dir, &settings.namespace_ids)
        .with_context(|| format!("cannot open mirror at {} (run `propsync snapshot`)", dir.display()))
}

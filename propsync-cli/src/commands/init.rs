//! `propsync init [--force] [--host ..] [--port ..] [--layout ..]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use propsync_core::{settings, Layout, Settings};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LayoutArg {
    Hierarchical,
    Flattened,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Hierarchical => Layout::Hierarchical,
            LayoutArg::Flattened => Layout::Flattened,
        }
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,

    /// Authority host.
    #[arg(long)]
    pub host: Option<String>,

    /// Authority port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Mirror directory (default ~/.propsync/mirror).
    #[arg(long)]
    pub mirror: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = settings::config_path_at(&home);
        if path.exists() && !self.force {
            println!("config already exists: {} (use --force to overwrite)", path.display());
            return Ok(());
        }

        let mut settings = Settings::default();
        if let Some(host) = self.host {
            settings.authority.host = host;
        }
        if let Some(port) = self.port {
            settings.authority.port = port;
        }
        settings.mirror.dir = self.mirror;
        if let Some(layout) = self.layout {
            settings.mirror.layout = layout.into();
        }

        let written = settings::save_at(&home, &settings)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("✓ Wrote {}", written.display());
        println!("  Authority: {}", settings.authority.base_url());
        println!("  Mirror:    {}", settings.mirror_dir_at(&home).display());
        Ok(())
    }
}

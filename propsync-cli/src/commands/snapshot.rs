//! `propsync snapshot [--no-clean]`: refresh the mirror once, without git.

use anyhow::{bail, Context, Result};
use clap::Args;

use propsync_core::ConfigAuthority;
use propsync_remote::NacosClient;
use propsync_snapshot::refresh_mirror;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Keep mirror entries the authority no longer lists.
    #[arg(long)]
    pub no_clean: bool,
}

impl SnapshotArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let client = NacosClient::new(&settings.authority);
        if !client.is_online() {
            bail!("authority {} is offline", client.base_url());
        }

        let root = settings.mirror_dir_at(&home);
        let clean = settings.mirror.clean && !self.no_clean;
        let report = refresh_mirror(
            &client,
            &root,
            settings.mirror.layout,
            &settings.namespace_ids,
            clean,
        )
        .with_context(|| format!("failed to refresh {}", root.display()))?;

        println!("✓ Mirror refreshed: {}", root.display());
        println!("  Namespaces: {}", report.namespaces);
        println!(
            "  Entries:    {} fetched, {} written, {} unchanged, {} removed",
            report.fetched, report.written, report.unchanged, report.removed
        );
        Ok(())
    }
}

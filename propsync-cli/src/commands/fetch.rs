//! `propsync fetch`: rule against the live authority, bypassing the mirror.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use propsync_core::ConfigAuthority;
use propsync_remote::NacosClient;
use propsync_snapshot::{resolve_from_remote, RemoteOptions};

use super::RuleArgs;

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub rule: RuleArgs,

    /// Persist every hit under DIR/<namespace>/<group>/<data id>.
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FetchedEntry {
    key: String,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

impl FetchArgs {
    pub fn run(self) -> Result<()> {
        let rule = self.rule.rule()?;
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let client = NacosClient::new(&settings.authority);
        if !client.is_online() {
            bail!("authority {} is offline", client.base_url());
        }

        let options = RemoteOptions {
            destination: self.dest,
        };
        let hits = resolve_from_remote(&rule, &client, &settings.namespace_ids, &options)
            .with_context(|| format!("failed to resolve against {}", client.base_url()))?;

        let entries: Vec<FetchedEntry> = hits
            .into_iter()
            .map(|hit| FetchedEntry {
                key: hit.key.to_string(),
                bytes: hit.content.len(),
                path: hit.path,
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        if entries.is_empty() {
            println!("{}", "nothing on the authority matches the rule".yellow());
            return Ok(());
        }
        for entry in &entries {
            match &entry.path {
                Some(path) => println!("  {} {} -> {}", "+".green(), entry.key, path.display()),
                None => println!("  {} {} ({} bytes)", "+".green(), entry.key, entry.bytes),
            }
        }
        println!("✓ {} entr{} fetched", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
        Ok(())
    }
}

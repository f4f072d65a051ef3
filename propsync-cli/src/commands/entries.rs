//! `propsync entries`: what the mirror holds.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use propsync_core::{ConfigKey, Stage};

#[derive(Args, Debug)]
pub struct EntriesArgs {
    /// Only the entries a stage summary would include, in override order.
    #[arg(long)]
    pub stage: Option<String>,

    /// With --stage, include the DEBUG group.
    #[arg(long, requires = "stage")]
    pub debug: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "namespace")]
    namespace: String,
    #[tabled(rename = "group")]
    group: String,
    #[tabled(rename = "data id")]
    data_id: String,
}

impl EntriesArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let index = super::open_mirror(&home, &settings)?;

        let keys: Vec<ConfigKey> = match &self.stage {
            Some(stage) => {
                let stage: Stage = stage.parse()?;
                index.list_for_stage(stage, self.debug)?
            }
            None => index.list_all()?.into_iter().collect(),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&keys).context("failed to render entries JSON")?
            );
            return Ok(());
        }

        if keys.is_empty() {
            println!("{}", "mirror holds no matching entries".yellow());
            return Ok(());
        }
        let rows = keys.into_iter().map(|k| EntryRow {
            namespace: k.namespace,
            group: k.group,
            data_id: k.data_id,
        });
        let count = rows.len();
        println!("{}", Table::new(rows).with(Style::rounded()));
        println!("{count} entr{}", if count == 1 { "y" } else { "ies" });
        Ok(())
    }
}

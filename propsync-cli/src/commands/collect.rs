//! `propsync collect <job> --out DIR`: one properties file per test plan.
//!
//! The test-plan mapping is read from the mirror, so run `propsync snapshot`
//! first on a fresh machine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use propsync_snapshot::{load_mapping, prepare_job};

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// CI job name, e.g. `ci_DEBUG_core400s`.
    pub job: String,

    /// Workspace directory receiving `<plan>.properties`.
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "test plan")]
    plan: String,
    #[tabled(rename = "devices")]
    devices: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "output")]
    output: String,
}

impl CollectArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home)?;
        let index = super::open_mirror(&home, &settings)?;

        let mapping = load_mapping(index.as_ref(), &settings.test_plan_mapping)
            .context("failed to load the test-plan mapping")?;
        let report = prepare_job(&self.job, index.as_ref(), &mapping, &self.out)
            .with_context(|| format!("failed to collect job '{}'", self.job))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "{} {} on {}{}",
            "job".bold(),
            report.job.canonical_name,
            report.job.stage,
            if report.job.is_debug { " (debug)" } else { "" }
        );
        let rows: Vec<PlanRow> = report
            .plans
            .iter()
            .map(|p| PlanRow {
                plan: p.plan.clone(),
                devices: p.devices.join(", "),
                files: p.bundle.len(),
                output: p.output.display().to_string(),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
        println!(
            "parallel: {}",
            if report.parallel { "yes".green() } else { "no".normal() }
        );
        Ok(())
    }
}

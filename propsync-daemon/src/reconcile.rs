//! Keeps the authority's database snapshots in step with the database.
//!
//! Every tick compares each tracked table with the YAML snapshot stored at
//! `<stage namespace>/<group>/<data id>`. A missing snapshot or any
//! difference republishes the table and raises an alert.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use propsync_core::settings::TableSpec;
use propsync_core::{ConfigAuthority, NamespaceIds, Settings, Stage};
use propsync_remote::Notifier;

use crate::diff::diff;
use crate::error::DaemonError;
use crate::tables::ReferenceSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Unchanged,
    /// No snapshot existed; the table was published for the first time.
    Seeded { rows: usize },
    Republished { changes: usize },
}

#[derive(Debug, Default)]
pub struct TickReport {
    /// The authority was offline; no table was looked at.
    pub skipped: bool,
    pub tables: Vec<(String, Result<TableOutcome, DaemonError>)>,
}

pub struct ReconciliationLoop<R> {
    authority: Arc<dyn ConfigAuthority>,
    source: R,
    notifier: Arc<dyn Notifier>,
    stage: Stage,
    tenant: String,
    group: String,
    tables: Vec<TableSpec>,
    interval: Duration,
    at_all: bool,
}

impl<R: ReferenceSource> ReconciliationLoop<R> {
    pub fn new(
        authority: Arc<dyn ConfigAuthority>,
        source: R,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        let reconcile = &settings.reconcile;
        Self {
            authority,
            source,
            notifier,
            stage: reconcile.stage,
            tenant: tenant_for(&settings.namespace_ids, reconcile.stage),
            group: reconcile.group.clone(),
            tables: reconcile.tables.clone(),
            interval: Duration::from_secs(reconcile.interval_secs.max(1)),
            at_all: settings.alert.at_all,
        }
    }

    /// Tick immediately, then every interval, until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        tracing::info!(
            stage = %self.stage,
            tables = self.tables.len(),
            interval_secs = self.interval.as_secs(),
            "reconciliation loop started"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        Ok(())
    }

    pub async fn tick(&self) -> TickReport {
        let authority = self.authority.clone();
        let online = tokio::task::spawn_blocking(move || authority.is_online())
            .await
            .unwrap_or(false);
        if !online {
            tracing::warn!("authority offline, reconciliation tick skipped");
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        }

        let mut report = TickReport::default();
        for table in &self.tables {
            let outcome = self.reconcile_table(table).await;
            match &outcome {
                Ok(TableOutcome::Unchanged) => {
                    tracing::debug!(table = %table.name, "table unchanged")
                }
                Ok(outcome) => tracing::info!(table = %table.name, ?outcome, "table republished"),
                Err(err) => tracing::error!(
                    table = %table.name,
                    class = %err.class(),
                    error = %err,
                    "table reconciliation failed"
                ),
            }
            report.tables.push((table.name.clone(), outcome));
        }
        report
    }

    async fn reconcile_table(&self, table: &TableSpec) -> Result<TableOutcome, DaemonError> {
        let current = self.source.fetch_table(table).await?;
        let snapshot = self.blocking_get(table).await?;

        let (outcome, alert) = match snapshot.filter(|s| !s.trim().is_empty()) {
            None => {
                let rows = current.as_object().map_or(0, |m| m.len());
                let alert = format!(
                    "DB ({}) snapshot of table {} missing on the authority, published {rows} row(s)",
                    self.stage, table.name
                );
                (TableOutcome::Seeded { rows }, alert)
            }
            Some(text) => {
                let previous: Value = serde_yaml::from_str(&text)?;
                let changes = diff(&previous, &current);
                if changes.is_empty() {
                    return Ok(TableOutcome::Unchanged);
                }
                let alert = format!(
                    "DB ({}) changes on table {} detected: {}",
                    self.stage,
                    table.name,
                    changes.pretty()
                );
                (
                    TableOutcome::Republished {
                        changes: changes.len(),
                    },
                    alert,
                )
            }
        };

        let yaml = serde_yaml::to_string(&current)?;
        self.blocking_publish(table, yaml).await?;
        self.alert(alert).await;
        Ok(outcome)
    }

    async fn blocking_get(&self, table: &TableSpec) -> Result<Option<String>, DaemonError> {
        let authority = self.authority.clone();
        let (tenant, group, data_id) = (
            self.tenant.clone(),
            self.group.clone(),
            table.data_id.clone(),
        );
        tokio::task::spawn_blocking(move || authority.get_config(&tenant, &group, &data_id))
            .await
            .map_err(|e| join_err("snapshot fetch", e))?
            .map_err(DaemonError::from)
    }

    async fn blocking_publish(&self, table: &TableSpec, content: String) -> Result<(), DaemonError> {
        let authority = self.authority.clone();
        let (tenant, group, data_id) = (
            self.tenant.clone(),
            self.group.clone(),
            table.data_id.clone(),
        );
        tokio::task::spawn_blocking(move || {
            authority.publish_config(&tenant, &group, &data_id, &content)
        })
        .await
        .map_err(|e| join_err("snapshot publish", e))?
        .map_err(DaemonError::from)
    }

    /// Alert delivery failures are logged; the table state is already
    /// published.
    async fn alert(&self, text: String) {
        let notifier = self.notifier.clone();
        let at_all = self.at_all;
        let sent = tokio::task::spawn_blocking(move || notifier.notify(&text, at_all)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "alert delivery failed"),
            Err(err) => tracing::warn!(error = %err, "alert worker failed"),
        }
    }
}

fn tenant_for(ids: &NamespaceIds, stage: Stage) -> String {
    ids.id_of(stage.as_str()).to_owned()
}

fn join_err(task: &str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::Join {
        task: task.to_owned(),
        reason: err.to_string(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

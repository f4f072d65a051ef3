//! The sync engine: a single consumer of commit reasons.
//!
//! Notifications are queued as timestamped reasons. The engine waits for the
//! first one, then keeps draining the queue: every drained batch becomes one
//! pass, with the batch (one reason per line) as the commit message. Reasons
//! queued while a pass runs are picked up by the next pass, so any number of
//! notifications during a pass costs exactly one extra pass.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc, watch};

use propsync_core::ConfigAuthority;
use propsync_remote::ConfigWatcher;

use crate::error::DaemonError;
use crate::history::CommitHistory;
use crate::pass::PassReport;
use crate::paths::WATCH_BACKOFF;

pub const REASON_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `<local time> | <content>`
pub fn format_reason(at: DateTime<Local>, content: &str) -> String {
    format!("{} | {content}", at.format(REASON_TIME_FORMAT))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Syncing,
}

/// Producer side of the engine queue.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::UnboundedSender<String>,
}

impl SyncTrigger {
    /// Queue a sync reason stamped with the current local time.
    pub fn notify(&self, content: &str) -> Result<(), DaemonError> {
        self.tx
            .send(format_reason(Local::now(), content))
            .map_err(|_| DaemonError::ChannelClosed("sync trigger"))
    }
}

/// One sync pass over the mirror, run on a blocking worker.
pub trait PassRunner: Send + Sync + 'static {
    fn run_pass(&self, message: &str) -> Result<PassReport, DaemonError>;
}

pub struct SyncEngine<P> {
    runner: Arc<P>,
    history: CommitHistory,
    rx: mpsc::UnboundedReceiver<String>,
    state: watch::Sender<EngineState>,
}

impl<P: PassRunner> SyncEngine<P> {
    pub fn new(
        runner: Arc<P>,
        history: CommitHistory,
    ) -> (SyncTrigger, Self, watch::Receiver<EngineState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(EngineState::Idle);
        let engine = Self {
            runner,
            history,
            rx,
            state,
        };
        (SyncTrigger { tx }, engine, state_rx)
    }

    /// Consume reasons until shutdown or until every trigger is dropped.
    /// Pass failures are logged; they never end the loop.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        loop {
            let first = tokio::select! {
                _ = shutdown_rx.recv() => break,
                reason = self.rx.recv() => match reason {
                    Some(reason) => reason,
                    None => break,
                },
            };

            self.state.send_replace(EngineState::Syncing);
            let mut batch = vec![first];
            loop {
                while let Ok(reason) = self.rx.try_recv() {
                    batch.push(reason);
                }
                if batch.is_empty() {
                    break;
                }
                let reasons = std::mem::take(&mut batch);
                run_batch(self.runner.clone(), self.history.clone(), reasons).await;
            }
            self.state.send_replace(EngineState::Idle);
        }
        Ok(())
    }
}

async fn run_batch<P: PassRunner>(runner: Arc<P>, history: CommitHistory, reasons: Vec<String>) {
    tracing::info!(reasons = reasons.len(), "sync pass starting");

    // the batch survives a history write failure
    let joined = tokio::task::spawn_blocking(move || {
        let message = history.record(&reasons).unwrap_or_else(|err| {
            tracing::error!(error = %err, "commit history not recorded");
            reasons.join("\n")
        });
        runner.run_pass(&message)
    })
    .await;

    match joined {
        Ok(Ok(report)) => tracing::info!(
            fetched = report.refresh.fetched,
            summaries = report.summaries,
            published = report.published,
            publish_failures = report.publish_failures,
            commit = ?report.commit,
            "sync pass finished"
        ),
        Ok(Err(err)) => tracing::error!(class = %err.class(), error = %err, "sync pass failed"),
        Err(err) => tracing::error!(error = %err, "sync pass worker failed"),
    }
}

/// Long-poll the trigger entry and forward every change to `trigger`.
///
/// Each poll runs on a blocking worker. A failed poll is retried after
/// [`WATCH_BACKOFF`].
pub async fn watch_trigger<A>(
    mut watcher: ConfigWatcher<A>,
    trigger: SyncTrigger,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    A: ConfigAuthority + 'static,
{
    tracing::info!(key = %watcher.key(), "watching sync trigger");
    loop {
        let poll = tokio::task::spawn_blocking(move || {
            let result = watcher.poll();
            (watcher, result)
        });
        let (returned, result) = tokio::select! {
            _ = shutdown_rx.recv() => break,
            joined = poll => joined.map_err(|e| DaemonError::Join {
                task: "trigger poll".to_owned(),
                reason: e.to_string(),
            })?,
        };
        watcher = returned;

        match result {
            Ok(Some(content)) => trigger.notify(&content)?,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "trigger poll failed, retrying");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(WATCH_BACKOFF) => {}
                }
            }
        }
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

use propsync_core::{settings, ConfigAuthority, Settings};
use propsync_remote::{ConfigWatcher, DingTalkNotifier, LogNotifier, NacosClient, Notifier};

use crate::engine::{watch_trigger, SyncEngine};
use crate::error::{io_err, DaemonError};
use crate::git::{GitMirror, VersionControl};
use crate::history::CommitHistory;
use crate::log_rotation::{rotate_logs, LogKind};
use crate::pass::MirrorPass;
use crate::paths::{data_dir, logs_dir, reconcile_log_path, sync_log_path, ROTATION_INTERVAL};
use crate::reconcile::ReconciliationLoop;
use crate::tables::{load_credentials, MySqlSource, ReferenceSource};

/// How long shutdown waits for an in-flight blocking call (a long-poll or a
/// pass) before the runtime is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Run the sync daemon for `home` and block until it exits.
pub fn start_sync_blocking(home: &Path) -> Result<(), DaemonError> {
    let settings = settings::load_at(home)?;
    ensure_runtime_dirs(home)?;
    init_tracing(&sync_log_path(home));

    let mirror_dir = settings.mirror_dir_at(home);
    let vcs = GitMirror::open_or_clone(&mirror_dir, settings.mirror.repo_url.as_deref())?;
    tracing::info!(mirror = %mirror_dir.display(), branch = vcs.branch(), "sync daemon starting");
    let authority = NacosClient::new(&settings.authority);

    let runtime = build_runtime()?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let result = runtime.block_on(run_sync(
        home.to_path_buf(),
        settings,
        authority,
        vcs,
        shutdown_tx,
    ));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Run the reconciliation daemon for `home` and block until it exits.
pub fn start_reconcile_blocking(home: &Path) -> Result<(), DaemonError> {
    let settings = settings::load_at(home)?;
    ensure_runtime_dirs(home)?;
    init_tracing(&reconcile_log_path(home));

    let authority: Arc<dyn ConfigAuthority> = Arc::new(NacosClient::new(&settings.authority));
    let notifier: Arc<dyn Notifier> = match &settings.alert.webhook {
        Some(webhook) => Arc::new(DingTalkNotifier::new(webhook.as_str())),
        None => {
            tracing::warn!("no alert webhook configured, alerts go to the log");
            Arc::new(LogNotifier)
        }
    };

    let runtime = build_runtime()?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let result = runtime.block_on(async {
        let source = connect_source(&settings, authority.clone()).await?;
        run_reconcile(
            home.to_path_buf(),
            settings,
            authority,
            source,
            notifier,
            shutdown_tx,
        )
        .await
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Sync daemon tasks: trigger watcher, engine, log rotation, signal handler.
pub async fn run_sync<A, V>(
    home: PathBuf,
    settings: Settings,
    authority: A,
    vcs: V,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError>
where
    A: ConfigAuthority + Clone + 'static,
    V: VersionControl + 'static,
{
    let mirror_dir = settings.mirror_dir_at(&home);
    let pass = Arc::new(MirrorPass::new(authority.clone(), vcs, mirror_dir, &settings));
    let (trigger, engine, _state) = SyncEngine::new(pass, CommitHistory::at(&home));
    let watcher = ConfigWatcher::new(
        authority,
        settings.trigger.clone(),
        &settings.namespace_ids,
        Duration::from_millis(settings.authority.long_poll_timeout_ms),
    );

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = watch_trigger(watcher, trigger, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let engine_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = engine.run(shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = spawn_rotation(home, LogKind::Sync, shutdown_tx.clone());
    let signal_handle = spawn_signal_handler(shutdown_tx);

    let (watcher_result, engine_result, rotation_result, signal_result) =
        tokio::join!(watcher_handle, engine_handle, rotation_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("engine", engine_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Reconcile daemon tasks: reconciliation loop, log rotation, signal handler.
pub async fn run_reconcile<R>(
    home: PathBuf,
    settings: Settings,
    authority: Arc<dyn ConfigAuthority>,
    source: R,
    notifier: Arc<dyn Notifier>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError>
where
    R: ReferenceSource + 'static,
{
    let reconciler = ReconciliationLoop::new(authority, source, notifier, &settings);

    let loop_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = reconciler.run(shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    let rotation_handle = spawn_rotation(home, LogKind::Reconcile, shutdown_tx.clone());
    let signal_handle = spawn_signal_handler(shutdown_tx);

    let (loop_result, rotation_result, signal_result) =
        tokio::join!(loop_handle, rotation_handle, signal_handle);

    handle_join("reconcile", loop_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn connect_source(
    settings: &Settings,
    authority: Arc<dyn ConfigAuthority>,
) -> Result<MySqlSource, DaemonError> {
    if let Some(url) = &settings.reconcile.database_url {
        return MySqlSource::from_url(url);
    }
    let ids = settings.namespace_ids.clone();
    let stage = settings.reconcile.stage;
    let keys = settings.reconcile.credentials.clone();
    let credentials = tokio::task::spawn_blocking(move || {
        load_credentials(authority.as_ref(), &ids, stage, &keys)
    })
    .await
    .map_err(|e| DaemonError::Join {
        task: "credentials".to_owned(),
        reason: e.to_string(),
    })??;
    tracing::info!(host = %credentials.host, database = %credentials.database, "database credentials loaded");
    Ok(MySqlSource::new(credentials.connect_options()))
}

fn spawn_rotation(
    home: PathBuf,
    kind: LogKind,
    shutdown_tx: broadcast::Sender<()>,
) -> tokio::task::JoinHandle<Result<(), DaemonError>> {
    tokio::spawn(async move {
        let result = log_rotation_task(home, kind, shutdown_tx.subscribe()).await;
        let _ = shutdown_tx.send(());
        result
    })
}

fn spawn_signal_handler(
    shutdown: broadcast::Sender<()>,
) -> tokio::task::JoinHandle<Result<(), DaemonError>> {
    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => Ok(()),
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, shutting down");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(io_err("ctrl-c handler", err)),
            },
        }
    })
}

async fn log_rotation_task(
    home: PathBuf,
    kind: LogKind,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // no rotation at startup

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || rotate_logs(&home, kind))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task: task.to_owned(),
            reason: err.to_string(),
        }),
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [logs_dir(home), data_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

/// Appends each event to the log file, reopening it so rotation takes
/// effect immediately.
#[derive(Debug, Clone)]
struct LogFile {
    path: PathBuf,
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::stderr()),
        }
    }
}

/// `PROPSYNC_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(log_path: &Path) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = LogFile {
        path: log_path.to_path_buf(),
    };
    let json = std::env::var("PROPSYNC_LOG_FORMAT").is_ok_and(|v| v == "json");
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn rotation_task_exits_on_shutdown() {
        let home = TempDir::new().unwrap();
        let (shutdown_tx, _) = broadcast::channel::<()>(16);
        let handle = spawn_rotation(home.path().to_path_buf(), LogKind::Sync, shutdown_tx.clone());
        tokio::time::advance(ROTATION_INTERVAL * 3).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn join_failures_name_the_task() {
        let err = handle_join("engine", Ok(Err(DaemonError::ChannelClosed("x")))).unwrap_err();
        assert!(matches!(err, DaemonError::ChannelClosed(_)));
    }

    #[test]
    fn log_file_writer_appends() {
        let dir = TempDir::new().unwrap();
        let log = LogFile {
            path: dir.path().join("sync.log"),
        };
        log.make_writer().write_all(b"one\n").unwrap();
        log.make_writer().write_all(b"two\n").unwrap();
        assert_eq!(fs::read_to_string(&log.path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn runtime_dirs_are_created_under_home() {
        let home = TempDir::new().unwrap();
        ensure_runtime_dirs(home.path()).unwrap();
        assert!(logs_dir(home.path()).is_dir());
        assert!(data_dir(home.path()).is_dir());
    }
}

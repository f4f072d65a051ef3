use std::path::{Path, PathBuf};
use std::time::Duration;

use propsync_core::settings::propsync_root;

pub const SYNC_LOG: &str = "sync.log";
pub const RECONCILE_LOG: &str = "reconcile.log";
pub const COMMIT_LOG: &str = "commit.log";

/// Pause after a failed long-poll before subscribing again.
pub const WATCH_BACKOFF: Duration = Duration::from_secs(5);
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(5);

pub fn logs_dir(home: &Path) -> PathBuf {
    propsync_root(home).join("logs")
}

pub fn sync_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(SYNC_LOG)
}

pub fn reconcile_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(RECONCILE_LOG)
}

pub fn data_dir(home: &Path) -> PathBuf {
    propsync_root(home).join("data")
}

pub fn commit_log_path(home: &Path) -> PathBuf {
    data_dir(home).join(COMMIT_LOG)
}

//! Size-based rotation of the daemon log files.
//!
//! `sync.log` becomes `sync.log.1`, older copies shift up by one and the
//! copy past the limit is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{reconcile_log_path, sync_log_path};

/// Which daemon's log to rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Sync,
    Reconcile,
}

impl LogKind {
    pub fn path(self, home: &Path) -> PathBuf {
        match self {
            LogKind::Sync => sync_log_path(home),
            LogKind::Reconcile => reconcile_log_path(home),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    /// 10 MiB, five rotated copies.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Rotate `log_path` once it reaches `policy.max_bytes`.
///
/// Returns whether a rotation happened. A missing log is not an error.
pub fn rotate_if_needed(log_path: &Path, policy: &RotationPolicy) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < policy.max_bytes || policy.max_files == 0 {
        return Ok(false);
    }

    let oldest = backup_path(log_path, policy.max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..policy.max_files).rev() {
        let from = backup_path(log_path, n);
        if from.exists() {
            fs::rename(&from, backup_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, backup_path(log_path, 1))?;

    // recreate the path so `daemon logs` finds a file before the next event
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;
    Ok(true)
}

pub fn rotate_logs(home: &Path, kind: LogKind) {
    let path = kind.path(home);
    match rotate_if_needed(&path, &RotationPolicy::default()) {
        Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "log rotation failed"),
    }
}

/// `sync.log` + 2 -> `sync.log.2`
fn backup_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "propsync.log".to_owned());
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SMALL: RotationPolicy = RotationPolicy {
        max_bytes: 16,
        max_files: 3,
    };

    #[test]
    fn small_or_missing_logs_stay_put() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync.log");
        assert!(!rotate_if_needed(&log, &SMALL).unwrap());

        fs::write(&log, "short").unwrap();
        assert!(!rotate_if_needed(&log, &SMALL).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn oversized_log_moves_to_first_backup() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync.log");
        fs::write(&log, "x".repeat(32)).unwrap();

        assert!(rotate_if_needed(&log, &SMALL).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read_to_string(backup_path(&log, 1)).unwrap().len(), 32);
    }

    #[test]
    fn backups_shift_and_oldest_is_dropped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("reconcile.log");

        for round in 1..=4u8 {
            fs::write(&log, vec![b'0' + round; 20]).unwrap();
            rotate_if_needed(&log, &SMALL).unwrap();
        }

        // newest first: round 4, 3, 2; round 1 fell off
        assert_eq!(fs::read(backup_path(&log, 1)).unwrap()[0], b'4');
        assert_eq!(fs::read(backup_path(&log, 3)).unwrap()[0], b'2');
        assert!(!backup_path(&log, 4).exists());
    }

    #[test]
    fn default_policy_and_log_locations() {
        let policy = RotationPolicy::default();
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.max_files, 5);

        let home = Path::new("/home/u");
        assert_eq!(LogKind::Sync.path(home), Path::new("/home/u/.propsync/logs/sync.log"));
        assert!(LogKind::Reconcile.path(home).ends_with("reconcile.log"));
    }
}

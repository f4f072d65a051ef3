use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use propsync_snapshot::SnapshotError;

/// Error surface for the sync engine, the reconciliation loop and their
/// runtimes.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] propsync_core::ConfigError),

    #[error("authority error: {0}")]
    Authority(#[from] propsync_core::AuthorityError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("alert delivery failed: {0}")]
    Notify(#[from] propsync_remote::NotifyError),

    #[error("git {op} failed: {detail}")]
    Git { op: String, detail: String },

    #[error("mirror at {dir} is not a git repository and no repo_url is configured")]
    MirrorNotARepository { dir: PathBuf },

    #[error("database credential '{key}' missing from the shared properties")]
    MissingCredential { key: String },

    #[error("database credential '{key}' has invalid value '{value}'")]
    InvalidCredential { key: String, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {reason}")]
    Join { task: String, reason: String },
}

/// How a failure is handled by the loops that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal to the operation, never retried.
    Configuration,
    /// Deferred to the next trigger or tick.
    TransientIo,
    /// Logged and skipped.
    DataIntegrity,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::TransientIo => "transient-io",
            ErrorClass::DataIntegrity => "data-integrity",
        })
    }
}

impl DaemonError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DaemonError::Config(_)
            | DaemonError::MissingCredential { .. }
            | DaemonError::InvalidCredential { .. }
            | DaemonError::MirrorNotARepository { .. }
            | DaemonError::Snapshot(SnapshotError::Config(_)) => ErrorClass::Configuration,
            DaemonError::Yaml(_)
            | DaemonError::Json(_)
            | DaemonError::Snapshot(SnapshotError::SnapshotUnavailable { .. })
            | DaemonError::Snapshot(SnapshotError::BundleEntryVanished { .. }) => {
                ErrorClass::DataIntegrity
            }
            _ => ErrorClass::TransientIo,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

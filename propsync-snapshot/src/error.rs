//! Error types for propsync-snapshot.

use std::path::PathBuf;

use thiserror::Error;

use propsync_core::{AuthorityError, ConfigError};

/// All errors that can arise from snapshot indexing, resolution and
/// aggregation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The mirror root does not exist.
    #[error("snapshot unavailable: {root} does not exist")]
    SnapshotUnavailable { root: PathBuf },

    /// A bundle entry disappeared between resolution and concatenation.
    #[error("bundle entry vanished before it could be read: {path}")]
    BundleEntryVanished { path: PathBuf },

    /// A worker thread panicked before reporting its result.
    #[error("worker panicked: {task}")]
    WorkerPanicked { task: String },

    /// An error from rule, mapping or settings handling.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An error talking to the authority.
    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SnapshotError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.into(),
        source,
    }
}

//! Error types for propsync-remote.

use thiserror::Error;

/// Failures delivering an alert.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("alert webhook unreachable: {0}")]
    Unreachable(String),

    #[error("alert webhook returned HTTP {0}")]
    Status(u16),

    /// The webhook answered but refused the message.
    #[error("alert rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
}

//! Error types for propsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building rules, parsing job names, decoding the
/// test-plan mapping, or loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A stage string outside `ci | testonline | predeploy | production`.
    #[error("invalid stage '{stage}'; expected one of ci, testonline, predeploy, production")]
    InvalidStage { stage: String },

    /// A job name whose suffix matches no stage token.
    #[error(
        "job name '{job}' must end with one of ci, testonline, predeploy or production (case insensitive)"
    )]
    UnrecognizedStage { job: String },

    /// A namespace string outside the rule namespace set.
    #[error("unrecognized namespace '{name}'; expected cross-env or a stage")]
    UnknownNamespace { name: String },

    /// The mapping has no entry under the requested key.
    #[error("no test-plan mapping entry for '{key}'")]
    MappingNotFound { key: String },

    /// The mapping entry exists but has the wrong shape for this lookup.
    #[error("invalid test-plan mapping entry '{key}': {reason}")]
    InvalidMapping { key: String, reason: String },

    /// A mapping path that is not relative.
    #[error("test-plan mapping entry '{key}' holds absolute path '{path}'; only relative paths are accepted")]
    AbsolutePath { key: String, path: String },

    /// Underlying I/O failure, with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file it came from.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

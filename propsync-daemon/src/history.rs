//! Append-only log of every commit reason the engine has acted on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};
use crate::paths::commit_log_path;

#[derive(Debug, Clone)]
pub struct CommitHistory {
    path: PathBuf,
}

impl CommitHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.propsync/data/commit.log`
    pub fn at(home: &Path) -> Self {
        Self::new(commit_log_path(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `reasons` (one per line) and return them joined as the pass
    /// message.
    pub fn record(&self, reasons: &[String]) -> Result<String, DaemonError> {
        let message = reasons.join("\n");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        writeln!(file, "{message}").map_err(|e| io_err(&self.path, e))?;
        Ok(message)
    }

    pub fn read_all(&self) -> Result<Vec<String>, DaemonError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }
}

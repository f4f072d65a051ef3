//! The git side of a sync pass.
//!
//! [`GitMirror`] shells out to the `git` binary in the mirror directory.
//! [`commit_and_push`] holds the retry policy: one pull (merge) and one more
//! push after a rejection, never more.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::error::{io_err, DaemonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Pushed,
    Rejected(String),
}

/// What the commit step of a pass ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitOutcome {
    CleanTree,
    Pushed,
    PushedAfterPull,
    /// Rejected again after the pull; the commit stays local.
    PushRejected,
}

pub trait VersionControl: Send + Sync {
    fn is_dirty(&self) -> Result<bool, DaemonError>;
    fn stage_all(&self) -> Result<(), DaemonError>;
    fn commit(&self, message: &str) -> Result<(), DaemonError>;
    fn push(&self) -> Result<PushStatus, DaemonError>;
    fn pull(&self) -> Result<(), DaemonError>;
}

pub fn commit_and_push(
    vcs: &dyn VersionControl,
    message: &str,
) -> Result<CommitOutcome, DaemonError> {
    if !vcs.is_dirty()? {
        tracing::warn!("working tree clean, nothing to commit");
        return Ok(CommitOutcome::CleanTree);
    }

    vcs.stage_all()?;
    vcs.commit(message)?;

    let reason = match vcs.push()? {
        PushStatus::Pushed => {
            tracing::info!("mirror pushed");
            return Ok(CommitOutcome::Pushed);
        }
        PushStatus::Rejected(reason) => reason,
    };

    tracing::warn!(%reason, "push rejected, pulling once before retrying");
    vcs.pull()?;
    match vcs.push()? {
        PushStatus::Pushed => {
            tracing::info!("mirror pushed after pull");
            Ok(CommitOutcome::PushedAfterPull)
        }
        PushStatus::Rejected(reason) => {
            tracing::error!(%reason, "push rejected again after pull; commit kept locally");
            Ok(CommitOutcome::PushRejected)
        }
    }
}

/// A git working copy on disk, pushing to `origin` on its current branch.
#[derive(Debug, Clone)]
pub struct GitMirror {
    dir: PathBuf,
    branch: String,
}

impl GitMirror {
    /// Open the working copy at `dir`, cloning `repo_url` into it first when
    /// `dir` is not a repository yet.
    pub fn open_or_clone(dir: &Path, repo_url: Option<&str>) -> Result<Self, DaemonError> {
        if !dir.join(".git").exists() {
            let Some(url) = repo_url else {
                return Err(DaemonError::MirrorNotARepository {
                    dir: dir.to_path_buf(),
                });
            };
            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            tracing::info!(url, dir = %dir.display(), "cloning mirror");
            let target = dir.to_string_lossy();
            run_git(None, "clone", &["clone", url, &target])?;
        }

        let branch = run_git(Some(dir), "symbolic-ref", &["symbolic-ref", "--short", "HEAD"])?
            .trim()
            .to_owned();
        Ok(Self {
            dir: dir.to_path_buf(),
            branch,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn git(&self, op: &str, args: &[&str]) -> Result<String, DaemonError> {
        run_git(Some(&self.dir), op, args)
    }
}

impl VersionControl for GitMirror {
    fn is_dirty(&self) -> Result<bool, DaemonError> {
        Ok(!self.git("status", &["status", "--porcelain"])?.trim().is_empty())
    }

    fn stage_all(&self) -> Result<(), DaemonError> {
        self.git("add", &["add", "-A"]).map(drop)
    }

    fn commit(&self, message: &str) -> Result<(), DaemonError> {
        self.git("commit", &["commit", "-q", "-m", message]).map(drop)
    }

    fn push(&self) -> Result<PushStatus, DaemonError> {
        match self.git("push", &["push", "-q", "origin", &self.branch]) {
            Ok(_) => Ok(PushStatus::Pushed),
            Err(DaemonError::Git { detail, .. }) => Ok(PushStatus::Rejected(detail)),
            Err(other) => Err(other),
        }
    }

    fn pull(&self) -> Result<(), DaemonError> {
        self.git(
            "pull",
            &["pull", "-q", "--no-rebase", "--no-edit", "origin", &self.branch],
        )
        .map(drop)
    }
}

/// Run `git args..` and return its stdout; a non-zero exit becomes
/// [`DaemonError::Git`] carrying stderr.
fn run_git(dir: Option<&Path>, op: &str, args: &[&str]) -> Result<String, DaemonError> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let output = command.output().map_err(|e| io_err("git", e))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(DaemonError::Git {
        op: op.to_owned(),
        detail: format!("status {}: {stderr}", output.status),
    })
}

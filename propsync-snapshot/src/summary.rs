//! Per-stage summary artifacts.
//!
//! A summary is the concatenation of every entry a stage can see
//! (`cross-env` then the stage namespace, groups `SHARED`, `DEVICE` and
//! optionally `DEBUG`). Summaries are regenerated wholesale: first as UTF-8
//! `.utf8` files in a scratch directory, then re-encoded and installed into
//! the mirror under the `summary` namespace, data id = stage.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use propsync_core::types::{SUMMARY_GROUP_DEBUG, SUMMARY_GROUP_STABLE, SUMMARY_NAMESPACE};
use propsync_core::{ConfigKey, MirrorEncoding, Stage};

use crate::aggregate::{concatenate, encode};
use crate::error::{io_err, SnapshotError};
use crate::index::SnapshotIndex;
use crate::writer::{atomic_write, WriteResult};

/// Extension of generated summaries before encoding.
pub const EXTENSION_BEFORE_ENCODE: &str = "utf8";

/// One generated summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryArtifact {
    pub stage: Stage,
    pub debug: bool,
    /// Generated UTF-8 file in the scratch directory.
    pub generated: PathBuf,
    /// Number of entries concatenated.
    pub entries: usize,
}

impl SummaryArtifact {
    pub fn group(&self) -> &'static str {
        summary_group(self.debug)
    }

    /// Key under which the summary lives in the mirror and on the authority.
    pub fn key(&self) -> ConfigKey {
        summary_key(self.stage, self.debug)
    }
}

pub fn summary_group(debug: bool) -> &'static str {
    if debug {
        SUMMARY_GROUP_DEBUG
    } else {
        SUMMARY_GROUP_STABLE
    }
}

pub fn summary_key(stage: Stage, debug: bool) -> ConfigKey {
    ConfigKey::new(SUMMARY_NAMESPACE, summary_group(debug), stage.as_str())
}

/// `<stage>+<STABLE|DEBUG>+summary`
pub fn summary_file_name(stage: Stage, debug: bool) -> String {
    format!("{}+{}+{}", stage, summary_group(debug), SUMMARY_NAMESPACE)
}

/// Generate one summary per stage (and per DEBUG variant when requested)
/// into `dst`, one scoped thread per summary.
///
/// Threads share only the read-only index and write disjoint files.
pub fn generate_all_stages_summary(
    index: &dyn SnapshotIndex,
    stages: &[Stage],
    debug_also: bool,
    dst: &Path,
) -> Result<Vec<SummaryArtifact>, SnapshotError> {
    fs::create_dir_all(dst).map_err(|e| io_err(dst, e))?;

    let mut jobs: Vec<(Stage, bool)> = stages.iter().map(|s| (*s, false)).collect();
    if debug_also {
        jobs.extend(stages.iter().map(|s| (*s, true)));
    }

    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|&(stage, debug)| {
                let handle = scope.spawn(move || generate_one(index, stage, debug, dst));
                (summary_file_name(stage, debug), handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(SnapshotError::WorkerPanicked { task: name }))
            })
            .collect()
    })
}

fn generate_one(
    index: &dyn SnapshotIndex,
    stage: Stage,
    debug: bool,
    dst: &Path,
) -> Result<SummaryArtifact, SnapshotError> {
    let keys = index.list_for_stage(stage, debug)?;
    let paths: Vec<PathBuf> = keys.iter().map(|k| index.path_of(k)).collect();
    let generated = dst.join(format!(
        "{}.{EXTENSION_BEFORE_ENCODE}",
        summary_file_name(stage, debug)
    ));
    concatenate(&paths, &generated, None)?;
    tracing::debug!(
        "summary generated for {stage} (debug: {debug}, entries: {})",
        paths.len()
    );
    Ok(SummaryArtifact {
        stage,
        debug,
        generated,
        entries: paths.len(),
    })
}

/// One summary installed into the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledSummary {
    pub key: ConfigKey,
    pub write: WriteResult,
    /// Content as stored in the mirror (after encoding).
    pub content: String,
}

/// Re-encode generated summaries and write them into the mirror.
pub fn install_summaries(
    artifacts: &[SummaryArtifact],
    index: &dyn SnapshotIndex,
    encoding: MirrorEncoding,
    dry_run: bool,
) -> Result<Vec<InstalledSummary>, SnapshotError> {
    artifacts
        .iter()
        .map(|artifact| {
            let raw = fs::read(&artifact.generated).map_err(|e| io_err(&artifact.generated, e))?;
            let text = String::from_utf8_lossy(&raw);
            if let Cow::Owned(_) = text {
                tracing::warn!(
                    "summary {} contains invalid UTF-8; replaced before encoding",
                    artifact.key()
                );
            }
            let content = encode(&text, encoding).into_owned();
            let key = artifact.key();
            let write = atomic_write(&index.path_of(&key), &content, dry_run)?;
            Ok(InstalledSummary {
                key,
                write,
                content,
            })
        })
        .collect()
}

/// Generate every stage summary (STABLE and DEBUG) in a scratch directory
/// and install them into the mirror.
pub fn refresh_summaries(
    index: &dyn SnapshotIndex,
    encoding: MirrorEncoding,
    dry_run: bool,
) -> Result<Vec<InstalledSummary>, SnapshotError> {
    let scratch = tempfile::Builder::new()
        .prefix("propsync-summary-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    let artifacts = generate_all_stages_summary(index, &Stage::ALL, true, scratch.path())?;
    install_summaries(&artifacts, index, encoding, dry_run)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

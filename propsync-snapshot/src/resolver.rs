//! Rule resolution against a local mirror or the live authority.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use propsync_core::{ConfigAuthority, ConfigKey, NamespaceIds, Rule};

use crate::error::{io_err, SnapshotError};
use crate::index::SnapshotIndex;

/// One resolved entry: its key and the absolute file holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleEntry {
    pub key: ConfigKey,
    pub path: PathBuf,
}

/// Ordered list of entries for one job. Later entries override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bundle {
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    pub fn paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve `rule` against the mirror.
///
/// Iterates namespaces, then groups, then data ids, keeping only entries
/// present in the mirror. Missing entries are skipped; an empty bundle is a
/// valid result.
pub fn resolve(rule: &Rule, index: &dyn SnapshotIndex) -> Bundle {
    let entries = rule
        .keys()
        .filter_map(|key| {
            if index.exists(&key) {
                let path = index.path_of(&key);
                Some(BundleEntry { key, path })
            } else {
                tracing::debug!("not in snapshot, skipped: {key}");
                None
            }
        })
        .collect();
    Bundle { entries }
}

/// Options for [`resolve_from_remote`].
#[derive(Debug, Clone, Default)]
pub struct RemoteOptions {
    /// Persist every hit under `<destination>/<namespace>/<group>/<data_id>`.
    pub destination: Option<PathBuf>,
}

/// One entry found on the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteHit {
    pub key: ConfigKey,
    pub content: String,
    /// Where the content was persisted, if requested.
    pub path: Option<PathBuf>,
}

/// Resolve `rule` by asking the authority for every key.
///
/// Absent entries are skipped. Transport failures abort the resolution.
pub fn resolve_from_remote(
    rule: &Rule,
    authority: &dyn ConfigAuthority,
    ids: &NamespaceIds,
    options: &RemoteOptions,
) -> Result<Vec<RemoteHit>, SnapshotError> {
    let mut hits = Vec::new();
    for key in rule.keys() {
        let tenant = ids.id_of(&key.namespace);
        let Some(content) = authority.get_config(tenant, &key.group, &key.data_id)? else {
            tracing::debug!("not on authority, skipped: {key}");
            continue;
        };

        let path = match &options.destination {
            Some(dest) => Some(persist(dest, &key, &content)?),
            None => None,
        };
        tracing::info!("resolved from authority: {key}");
        hits.push(RemoteHit { key, content, path });
    }
    Ok(hits)
}

fn persist(dest: &Path, key: &ConfigKey, content: &str) -> Result<PathBuf, SnapshotError> {
    let dir = dest.join(&key.namespace).join(&key.group);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let path = dir.join(&key.data_id);
    fs::write(&path, content).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Read-only views over a snapshot mirror.
//!
//! Two on-disk layouts are supported:
//!
//! ```text
//! hierarchical   <root>/<namespace>/<group>/<data_id>
//! flattened      <root>/<data_id>+<group>+<namespace_id>
//! ```
//!
//! Hidden entries (`.git`, editor swap files) are never indexed. In the
//! flattened layout names starting with `++` are reserved and names that do
//! not split into exactly three tokens are skipped.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use propsync_core::types::{DEBUG_GROUP, DEVICE_GROUP, SHARED_GROUP};
use propsync_core::{ConfigKey, Layout, Namespace, NamespaceIds, Stage};

use crate::error::{io_err, SnapshotError};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Maps configuration keys to files in a mirror.
pub trait SnapshotIndex: Send + Sync {
    /// Absolute mirror root.
    fn root(&self) -> &Path;

    /// File that holds (or would hold) `key`. Pure path arithmetic.
    fn path_of(&self, key: &ConfigKey) -> PathBuf;

    fn exists(&self, key: &ConfigKey) -> bool {
        self.path_of(key).is_file()
    }

    /// Every key present in the mirror.
    fn list_all(&self) -> Result<BTreeSet<ConfigKey>, SnapshotError>;

    /// Keys contributing to a stage summary, in override order:
    /// namespaces `[cross-env, stage]`, groups `[SHARED, DEVICE, (DEBUG)]`,
    /// data ids ascending.
    fn list_for_stage(&self, stage: Stage, debug: bool) -> Result<Vec<ConfigKey>, SnapshotError> {
        let all = self.list_all()?;
        let mut groups = vec![SHARED_GROUP, DEVICE_GROUP];
        if debug {
            groups.push(DEBUG_GROUP);
        }

        let mut keys = Vec::new();
        for namespace in [Namespace::CrossEnv, stage.namespace()] {
            for group in &groups {
                keys.extend(
                    all.iter()
                        .filter(|k| k.namespace == namespace.as_str() && k.group == *group)
                        .cloned(),
                );
            }
        }
        Ok(keys)
    }
}

/// Open the mirror at `root` with the given layout.
///
/// Fails with [`SnapshotError::SnapshotUnavailable`] when `root` is missing.
pub fn open_index(
    layout: Layout,
    root: &Path,
    ids: &NamespaceIds,
) -> Result<Box<dyn SnapshotIndex>, SnapshotError> {
    let root = canonical_root(root)?;
    Ok(match layout {
        Layout::Hierarchical => Box::new(HierarchicalIndex { root }),
        Layout::Flattened => Box::new(FlattenedIndex {
            root,
            ids: ids.clone(),
        }),
    })
}

fn canonical_root(root: &Path) -> Result<PathBuf, SnapshotError> {
    if !root.is_dir() {
        return Err(SnapshotError::SnapshotUnavailable {
            root: root.to_path_buf(),
        });
    }
    fs::canonicalize(root).map_err(|e| io_err(root, e))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Sorted `(name, path)` pairs of a directory, hidden entries removed.
fn visible_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, SnapshotError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                return None;
            }
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            Some((name, e.path(), is_dir))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Hierarchical
// ---------------------------------------------------------------------------

/// `<root>/<namespace>/<group>/<data_id>`
#[derive(Debug, Clone)]
pub struct HierarchicalIndex {
    root: PathBuf,
}

impl HierarchicalIndex {
    pub fn open(root: &Path) -> Result<Self, SnapshotError> {
        Ok(Self {
            root: canonical_root(root)?,
        })
    }
}

impl SnapshotIndex for HierarchicalIndex {
    fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &ConfigKey) -> PathBuf {
        self.root
            .join(&key.namespace)
            .join(&key.group)
            .join(&key.data_id)
    }

    fn list_all(&self) -> Result<BTreeSet<ConfigKey>, SnapshotError> {
        let mut keys = BTreeSet::new();
        for (namespace, ns_path, ns_is_dir) in visible_entries(&self.root)? {
            if !ns_is_dir {
                tracing::debug!("ignoring stray file at mirror root: {}", ns_path.display());
                continue;
            }
            for (group, group_path, group_is_dir) in visible_entries(&ns_path)? {
                if !group_is_dir {
                    tracing::debug!("ignoring file outside a group: {}", group_path.display());
                    continue;
                }
                for (data_id, _, is_dir) in visible_entries(&group_path)? {
                    if is_dir {
                        continue;
                    }
                    keys.insert(ConfigKey::new(namespace.as_str(), group.as_str(), data_id));
                }
            }
        }
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Flattened
// ---------------------------------------------------------------------------

/// `<root>/<data_id>+<group>+<namespace_id>`
#[derive(Debug, Clone)]
pub struct FlattenedIndex {
    root: PathBuf,
    ids: NamespaceIds,
}

impl FlattenedIndex {
    pub fn open(root: &Path, ids: NamespaceIds) -> Result<Self, SnapshotError> {
        Ok(Self {
            root: canonical_root(root)?,
            ids,
        })
    }

    /// Parse a flattened file name into a key, or `None` when the name is
    /// reserved or malformed.
    pub fn parse_name(&self, name: &str) -> Option<ConfigKey> {
        if name.starts_with("++") {
            return None;
        }
        let parts: Vec<&str> = name.split('+').collect();
        let [data_id, group, namespace_id] = parts.as_slice() else {
            return None;
        };
        if data_id.is_empty() || group.is_empty() {
            return None;
        }
        Some(ConfigKey::new(
            self.ids.name_of(namespace_id),
            *group,
            *data_id,
        ))
    }
}

impl SnapshotIndex for FlattenedIndex {
    fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &ConfigKey) -> PathBuf {
        self.root.join(format!(
            "{}+{}+{}",
            key.data_id,
            key.group,
            self.ids.id_of(&key.namespace)
        ))
    }

    fn list_all(&self) -> Result<BTreeSet<ConfigKey>, SnapshotError> {
        let mut keys = BTreeSet::new();
        for (name, path, is_dir) in visible_entries(&self.root)? {
            if is_dir || name.starts_with("++") {
                continue;
            }
            match self.parse_name(&name) {
                Some(key) => {
                    keys.insert(key);
                }
                None => tracing::debug!("skipping malformed snapshot name: {}", path.display()),
            }
        }
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Refresh the local mirror from the authority.
//!
//! Every namespace is fetched on its own scoped thread. Nothing on disk is
//! touched until every fetch has succeeded, so a failed refresh leaves the
//! previous mirror intact.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::thread;

use propsync_core::{ConfigAuthority, ConfigKey, Layout, NamespaceIds, NamespaceInfo, RemoteConfig};

use crate::error::{io_err, SnapshotError};
use crate::index::open_index;
use crate::writer::{atomic_write, WriteResult};

/// What a refresh did to the mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub namespaces: usize,
    pub fetched: usize,
    pub written: usize,
    pub unchanged: usize,
    /// Entries deleted because the authority no longer has them.
    pub removed: usize,
}

/// Download every entry of every namespace into the mirror at `root`.
///
/// With `clean`, mirror entries that the authority no longer lists are
/// deleted. Hidden paths (`.git`) are never touched.
pub fn refresh_mirror(
    authority: &dyn ConfigAuthority,
    root: &Path,
    layout: Layout,
    ids: &NamespaceIds,
    clean: bool,
) -> Result<RefreshReport, SnapshotError> {
    let namespaces = authority.namespaces()?;
    tracing::info!("refreshing {} namespace(s) into {}", namespaces.len(), root.display());

    let fetched = fetch_all(authority, &namespaces)?;

    fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    let index = open_index(layout, root, ids)?;

    let mut report = RefreshReport {
        namespaces: namespaces.len(),
        ..RefreshReport::default()
    };
    let mut seen = BTreeSet::new();
    for (tenant, configs) in &fetched {
        for config in configs {
            let key = ConfigKey::new(ids.name_of(tenant), config.group.as_str(), config.data_id.as_str());
            match atomic_write(&index.path_of(&key), &config.content, false)? {
                WriteResult::Unchanged { .. } => report.unchanged += 1,
                _ => report.written += 1,
            }
            report.fetched += 1;
            seen.insert(key);
        }
    }

    if clean {
        for stale in index.list_all()?.difference(&seen) {
            let path = index.path_of(stale);
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            tracing::info!("removed stale entry: {stale}");
            report.removed += 1;
        }
        if layout == Layout::Hierarchical {
            prune_empty_dirs(index.root())?;
        }
    }

    tracing::info!(
        "mirror refreshed: {} fetched, {} written, {} unchanged, {} removed",
        report.fetched,
        report.written,
        report.unchanged,
        report.removed
    );
    Ok(report)
}

type Fetched = Vec<(String, Vec<RemoteConfig>)>;

fn fetch_all(
    authority: &dyn ConfigAuthority,
    namespaces: &[NamespaceInfo],
) -> Result<Fetched, SnapshotError> {
    thread::scope(|scope| {
        let handles: Vec<_> = namespaces
            .iter()
            .map(|ns| {
                let handle = scope.spawn(move || {
                    tracing::info!("fetching namespace {} ({})", ns.show_name, ns.config_count);
                    authority.list_configs(&ns.id, ns.config_count.max(1))
                });
                (ns, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(ns, handle)| match handle.join() {
                Ok(result) => Ok((ns.id.clone(), result?)),
                Err(_) => Err(SnapshotError::WorkerPanicked {
                    task: format!("fetch namespace {}", ns.show_name),
                }),
            })
            .collect()
    })
}

fn prune_empty_dirs(root: &Path) -> Result<(), SnapshotError> {
    for entry in fs::read_dir(root).map_err(|e| io_err(root, e))?.flatten() {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_dir() {
            continue;
        }
        prune_empty_dirs(&path)?;
        let empty = fs::read_dir(&path)
            .map_err(|e| io_err(&path, e))?
            .next()
            .is_none();
        if empty {
            fs::remove_dir(&path).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use propsync_core::AuthorityError;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Fixed namespace listing; `fail` makes every listing error out.
    struct Fixed {
        namespaces: Vec<NamespaceInfo>,
        configs: BTreeMap<String, Vec<RemoteConfig>>,
        fail: bool,
    }

    impl Fixed {
        fn new(entries: &[(&str, &str, &str, &str)]) -> Self {
            let mut configs: BTreeMap<String, Vec<RemoteConfig>> = BTreeMap::new();
            for (tenant, group, data_id, content) in entries {
                configs.entry(tenant.to_string()).or_default().push(RemoteConfig {
                    data_id: data_id.to_string(),
                    group: group.to_string(),
                    content: content.to_string(),
                    tenant: Some(tenant.to_string()),
                });
            }
            let namespaces = configs
                .iter()
                .map(|(id, items)| NamespaceInfo {
                    id: id.clone(),
                    show_name: id.clone(),
                    config_count: items.len(),
                })
                .collect();
            Self {
                namespaces,
                configs,
                fail: false,
            }
        }
    }

    impl ConfigAuthority for Fixed {
        fn is_online(&self) -> bool {
            true
        }
        fn namespaces(&self) -> Result<Vec<NamespaceInfo>, AuthorityError> {
            Ok(self.namespaces.clone())
        }
        fn get_config(&self, _: &str, _: &str, _: &str) -> Result<Option<String>, AuthorityError> {
            Ok(None)
        }
        fn list_configs(&self, tenant: &str, _: usize) -> Result<Vec<RemoteConfig>, AuthorityError> {
            if self.fail {
                return Err(AuthorityError::Unreachable {
                    url: "mem".into(),
                    reason: "down".into(),
                });
            }
            Ok(self.configs.get(tenant).cloned().unwrap_or_default())
        }
        fn publish_config(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), AuthorityError> {
            Ok(())
        }
        fn listen(&self, _: &str, _: &str, _: &str, _: &str, _: Duration) -> Result<bool, AuthorityError> {
            Ok(false)
        }
    }

    #[test]
    fn hierarchical_refresh_uses_namespace_names() {
        let tmp = TempDir::new().unwrap();
        let authority = Fixed::new(&[
            ("env-01", "DEVICE", "core400s", "a=1\n"),
            ("cross-env", "SHARED", "common", "b=2\n"),
            ("", "DEFAULT_GROUP", "nacos.jmeter.test-plan", "x: y\n"),
        ]);

        let report =
            refresh_mirror(&authority, tmp.path(), Layout::Hierarchical, &NamespaceIds::default(), true)
                .unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.written, 3);
        assert_eq!(
            fs::read_to_string(tmp.path().join("ci/DEVICE/core400s")).unwrap(),
            "a=1\n"
        );
        assert!(tmp
            .path()
            .join("public/DEFAULT_GROUP/nacos.jmeter.test-plan")
            .exists());
    }

    #[test]
    fn flattened_refresh_removes_stale_entries_but_keeps_git() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(tmp.path().join("gone+DEVICE+env-01"), "old").unwrap();
        fs::write(tmp.path().join("core400s+DEVICE+env-01"), "a=1\n").unwrap();

        let authority = Fixed::new(&[("env-01", "DEVICE", "core400s", "a=1\n")]);
        let report =
            refresh_mirror(&authority, tmp.path(), Layout::Flattened, &NamespaceIds::default(), true)
                .unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.removed, 1);
        assert!(!tmp.path().join("gone+DEVICE+env-01").exists());
        assert!(tmp.path().join(".git/HEAD").exists());
    }

    #[test]
    fn without_clean_stale_entries_survive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gone+DEVICE+env-01"), "old").unwrap();
        let authority = Fixed::new(&[("env-01", "DEVICE", "core400s", "a=1\n")]);
        refresh_mirror(&authority, tmp.path(), Layout::Flattened, &NamespaceIds::default(), false)
            .unwrap();
        assert!(tmp.path().join("gone+DEVICE+env-01").exists());
    }

    #[test]
    fn failed_fetch_leaves_mirror_untouched() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep+DEVICE+env-01"), "old").unwrap();
        let mut authority = Fixed::new(&[("env-01", "DEVICE", "core400s", "a=1\n")]);
        authority.fail = true;

        let err =
            refresh_mirror(&authority, tmp.path(), Layout::Flattened, &NamespaceIds::default(), true)
                .unwrap_err();
        assert!(matches!(err, SnapshotError::Authority(_)));
        assert!(tmp.path().join("keep+DEVICE+env-01").exists());
        assert!(!tmp.path().join("core400s+DEVICE+env-01").exists());
    }
}

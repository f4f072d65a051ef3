//! One sync pass: authority -> mirror -> summaries -> authority -> git.

use std::path::{Path, PathBuf};
use std::thread;

use propsync_core::types::SUMMARY_NAMESPACE;
use propsync_core::{ConfigAuthority, Layout, MirrorEncoding, NamespaceIds, Settings};
use propsync_snapshot::{open_index, refresh_mirror, refresh_summaries, InstalledSummary, RefreshReport};

use crate::engine::PassRunner;
use crate::error::DaemonError;
use crate::git::{commit_and_push, CommitOutcome, VersionControl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub refresh: RefreshReport,
    pub summaries: usize,
    pub published: usize,
    pub publish_failures: usize,
    pub commit: CommitOutcome,
}

pub struct MirrorPass<A, V> {
    authority: A,
    vcs: V,
    mirror: PathBuf,
    layout: Layout,
    ids: NamespaceIds,
    clean: bool,
    encoding: MirrorEncoding,
}

impl<A, V> MirrorPass<A, V>
where
    A: ConfigAuthority,
    V: VersionControl,
{
    pub fn new(authority: A, vcs: V, mirror: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            authority,
            vcs,
            mirror: mirror.into(),
            layout: settings.mirror.layout,
            ids: settings.namespace_ids.clone(),
            clean: settings.mirror.clean,
            encoding: settings.mirror.encoding,
        }
    }

    pub fn mirror(&self) -> &Path {
        &self.mirror
    }

    fn run(&self, message: &str) -> Result<PassReport, DaemonError> {
        let refresh = refresh_mirror(
            &self.authority,
            &self.mirror,
            self.layout,
            &self.ids,
            self.clean,
        )?;

        let index = open_index(self.layout, &self.mirror, &self.ids)?;
        let installed = refresh_summaries(index.as_ref(), self.encoding, false)?;

        let failures = publish_summaries(&self.authority, &self.ids, &installed, message);
        let commit = commit_and_push(&self.vcs, message)?;

        Ok(PassReport {
            refresh,
            summaries: installed.len(),
            published: installed.len() - failures,
            publish_failures: failures,
            commit,
        })
    }
}

impl<A, V> PassRunner for MirrorPass<A, V>
where
    A: ConfigAuthority + 'static,
    V: VersionControl + 'static,
{
    fn run_pass(&self, message: &str) -> Result<PassReport, DaemonError> {
        self.run(message)
    }
}

/// Publish every summary as `<message>\n\n<summary>`, one thread per
/// summary. Returns the number of failed publishes.
pub fn publish_summaries(
    authority: &dyn ConfigAuthority,
    ids: &NamespaceIds,
    installed: &[InstalledSummary],
    message: &str,
) -> usize {
    let tenant = ids.id_of(SUMMARY_NAMESPACE);
    thread::scope(|scope| {
        let handles: Vec<_> = installed
            .iter()
            .map(|summary| {
                let handle = scope.spawn(move || {
                    let content = format!("{message}\n\n{}", summary.content);
                    authority.publish_config(
                        tenant,
                        &summary.key.group,
                        &summary.key.data_id,
                        &content,
                    )
                });
                (summary, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(summary, handle)| match handle.join() {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    tracing::warn!(key = %summary.key, error = %err, "summary publish failed");
                    1
                }
                Err(_) => {
                    tracing::warn!(key = %summary.key, "summary publish worker panicked");
                    1
                }
            })
            .sum()
    })
}

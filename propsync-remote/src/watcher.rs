//! Long-poll watch on a single authority entry.

use std::time::Duration;

use md5::{Digest, Md5};

use propsync_core::{AuthorityError, ConfigAuthority, ConfigKey, NamespaceIds};

/// Lowercase hex MD5 of `content`, as the authority computes it.
pub fn content_md5(content: &str) -> String {
    hex::encode(Md5::digest(content.as_bytes()))
}

/// The md5 a listener sends for an entry: empty when the entry is absent.
pub fn entry_md5(content: Option<&str>) -> String {
    content.map(content_md5).unwrap_or_default()
}

/// Watches one entry and reports each new content exactly once.
///
/// The first poll only records the current content; it never reports a
/// change. An absent entry is watched with an empty md5, so the long-poll
/// holds until the entry is first published.
pub struct ConfigWatcher<A> {
    authority: A,
    tenant: String,
    key: ConfigKey,
    timeout: Duration,
    md5: Option<String>,
}

impl<A: ConfigAuthority> ConfigWatcher<A> {
    pub fn new(authority: A, key: ConfigKey, ids: &NamespaceIds, timeout: Duration) -> Self {
        Self {
            tenant: ids.id_of(&key.namespace).to_owned(),
            authority,
            key,
            timeout,
            md5: None,
        }
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Block for at most one long-poll period.
    ///
    /// Returns `Some(content)` when the entry changed since the last observed
    /// content, `None` otherwise.
    pub fn poll(&mut self) -> Result<Option<String>, AuthorityError> {
        let Some(known) = self.md5.clone() else {
            let md5 = entry_md5(self.fetch()?.as_deref());
            tracing::info!("watching {} (md5 {:?})", self.key, md5);
            self.md5 = Some(md5);
            return Ok(None);
        };

        let changed = self.authority.listen(
            &self.tenant,
            &self.key.group,
            &self.key.data_id,
            &known,
            self.timeout,
        )?;
        if !changed {
            return Ok(None);
        }

        let current = self.fetch()?;
        let md5 = entry_md5(current.as_deref());
        if md5 == known {
            return Ok(None);
        }
        match &current {
            Some(_) => tracing::info!("{} changed (md5 {md5})", self.key),
            None => tracing::warn!("{} was removed", self.key),
        }
        self.md5 = Some(md5);
        Ok(current)
    }

    fn fetch(&self) -> Result<Option<String>, AuthorityError> {
        self.authority
            .get_config(&self.tenant, &self.key.group, &self.key.data_id)
    }
}

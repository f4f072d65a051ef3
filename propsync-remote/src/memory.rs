//! In-process authority and notifier doubles.
//!
//! Used by the tests of every crate that talks to the authority.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use propsync_core::{AuthorityError, ConfigAuthority, NamespaceInfo, RemoteConfig};

use crate::error::NotifyError;
use crate::notify::Notifier;
use crate::watcher::entry_md5;

type EntryKey = (String, String, String);

/// One `publish_config` call as seen by [`InMemoryAuthority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub tenant: String,
    pub group: String,
    pub data_id: String,
    pub content: String,
}

#[derive(Debug)]
struct State {
    entries: BTreeMap<EntryKey, String>,
    publications: Vec<Publication>,
    online: bool,
}

/// Thread-safe map of `(tenant, group, data_id)` to content.
///
/// `listen` blocks on a condition variable, so a publish from another
/// thread wakes pending long-polls immediately.
#[derive(Debug)]
pub struct InMemoryAuthority {
    state: Mutex<State>,
    changed: Condvar,
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                publications: Vec::new(),
                online: true,
            }),
            changed: Condvar::new(),
        }
    }
}

impl InMemoryAuthority {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an entry without recording a publication.
    pub fn set(&self, tenant: &str, group: &str, data_id: &str, content: &str) {
        self.lock()
            .entries
            .insert(entry_key(tenant, group, data_id), content.to_owned());
        self.changed.notify_all();
    }

    pub fn remove(&self, tenant: &str, group: &str, data_id: &str) {
        self.lock().entries.remove(&entry_key(tenant, group, data_id));
        self.changed.notify_all();
    }

    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    pub fn content(&self, tenant: &str, group: &str, data_id: &str) -> Option<String> {
        self.lock()
            .entries
            .get(&entry_key(tenant, group, data_id))
            .cloned()
    }

    /// Every publication so far, oldest first.
    pub fn publications(&self) -> Vec<Publication> {
        self.lock().publications.clone()
    }

    fn ensure_online(state: &State) -> Result<(), AuthorityError> {
        if state.online {
            Ok(())
        } else {
            Err(AuthorityError::Unreachable {
                url: "memory://".to_owned(),
                reason: "authority is offline".to_owned(),
            })
        }
    }
}

fn entry_key(tenant: &str, group: &str, data_id: &str) -> EntryKey {
    (tenant.to_owned(), group.to_owned(), data_id.to_owned())
}

impl ConfigAuthority for InMemoryAuthority {
    fn is_online(&self) -> bool {
        self.lock().online
    }

    fn namespaces(&self) -> Result<Vec<NamespaceInfo>, AuthorityError> {
        let state = self.lock();
        Self::ensure_online(&state)?;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (tenant, _, _) in state.entries.keys() {
            *counts.entry(tenant.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(id, config_count)| NamespaceInfo {
                id: id.to_owned(),
                show_name: if id.is_empty() { "public".to_owned() } else { id.to_owned() },
                config_count,
            })
            .collect())
    }

    fn get_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
    ) -> Result<Option<String>, AuthorityError> {
        let state = self.lock();
        Self::ensure_online(&state)?;
        Ok(state.entries.get(&entry_key(tenant, group, data_id)).cloned())
    }

    fn list_configs(
        &self,
        tenant: &str,
        _page_size: usize,
    ) -> Result<Vec<RemoteConfig>, AuthorityError> {
        let state = self.lock();
        Self::ensure_online(&state)?;
        Ok(state
            .entries
            .iter()
            .filter(|((t, _, _), _)| t == tenant)
            .map(|((t, group, data_id), content)| RemoteConfig {
                data_id: data_id.clone(),
                group: group.clone(),
                content: content.clone(),
                tenant: Some(t.clone()),
            })
            .collect())
    }

    fn publish_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> Result<(), AuthorityError> {
        let mut state = self.lock();
        Self::ensure_online(&state)?;
        state
            .entries
            .insert(entry_key(tenant, group, data_id), content.to_owned());
        state.publications.push(Publication {
            tenant: tenant.to_owned(),
            group: group.to_owned(),
            data_id: data_id.to_owned(),
            content: content.to_owned(),
        });
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn listen(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        md5: &str,
        timeout: Duration,
    ) -> Result<bool, AuthorityError> {
        let key = entry_key(tenant, group, data_id);
        let current_md5 = |state: &State| {
            entry_md5(state.entries.get(&key).map(String::as_str))
        };

        let state = self.lock();
        Self::ensure_online(&state)?;
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.online && current_md5(state) == md5
            })
            .unwrap_or_else(PoisonError::into_inner);
        Self::ensure_online(&state)?;
        Ok(current_md5(&state) != md5)
    }
}

/// Notifier that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    /// `(text, at_all)` pairs, oldest first.
    pub fn messages(&self) -> Vec<(String, bool)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str, at_all: bool) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((text.to_owned(), at_all));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_count_entries_per_tenant() {
        let authority = InMemoryAuthority::default();
        authority.set("env-01", "DEVICE", "a", "1");
        authority.set("env-01", "DEVICE", "b", "2");
        authority.set("", "DEFAULT_GROUP", "c", "3");

        let namespaces = authority.namespaces().unwrap();
        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespaces[0].show_name, "public");
        assert_eq!(namespaces[1].config_count, 2);
        assert_eq!(authority.list_configs("env-01", 1).unwrap().len(), 2);
    }

    #[test]
    fn publish_is_recorded_and_visible() {
        let authority = InMemoryAuthority::default();
        authority.publish_config("summary", "STABLE", "ci", "x").unwrap();
        assert_eq!(authority.content("summary", "STABLE", "ci").as_deref(), Some("x"));
        assert_eq!(authority.publications().len(), 1);
        authority.set("summary", "STABLE", "ci", "y");
        assert_eq!(authority.publications().len(), 1, "set is not a publication");
    }

    #[test]
    fn offline_rejects_every_call() {
        let authority = InMemoryAuthority::default();
        authority.set_online(false);
        assert!(authority.get_config("", "g", "d").is_err());
        assert!(authority.publish_config("", "g", "d", "c").is_err());
        assert!(authority
            .listen("", "g", "d", "", Duration::from_millis(10))
            .is_err());
    }
}

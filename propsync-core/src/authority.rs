//! The remote configuration authority, seen as a blocking key/value service.
//!
//! Namespaces are addressed by tenant id here (`""` is the default
//! namespace); callers translate logical names with
//! [`crate::types::NamespaceIds`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failures talking to the authority.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("authority returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// One namespace as listed by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Tenant id; empty for the default namespace.
    #[serde(rename = "namespace", default)]
    pub id: String,
    #[serde(rename = "namespaceShowName", default)]
    pub show_name: String,
    #[serde(rename = "configCount", default)]
    pub config_count: usize,
}

/// One configuration entry as returned by a namespace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub data_id: String,
    pub group: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Blocking access to the configuration authority.
///
/// `get_config` returns `Ok(None)` for any non-success status: an absent
/// entry and a refused lookup are treated alike. Transport failures are
/// errors.
pub trait ConfigAuthority: Send + Sync {
    fn is_online(&self) -> bool;

    fn namespaces(&self) -> Result<Vec<NamespaceInfo>, AuthorityError>;

    fn get_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
    ) -> Result<Option<String>, AuthorityError>;

    /// Every entry of one namespace, `page_size` entries per page.
    fn list_configs(
        &self,
        tenant: &str,
        page_size: usize,
    ) -> Result<Vec<RemoteConfig>, AuthorityError>;

    fn publish_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> Result<(), AuthorityError>;

    /// Long-poll one entry. Returns `true` when its content no longer
    /// matches `md5`, `false` when the poll timed out unchanged.
    fn listen(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        md5: &str,
        timeout: Duration,
    ) -> Result<bool, AuthorityError>;
}

impl<T: ConfigAuthority + ?Sized> ConfigAuthority for Arc<T> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }

    fn namespaces(&self) -> Result<Vec<NamespaceInfo>, AuthorityError> {
        (**self).namespaces()
    }

    fn get_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
    ) -> Result<Option<String>, AuthorityError> {
        (**self).get_config(tenant, group, data_id)
    }

    fn list_configs(
        &self,
        tenant: &str,
        page_size: usize,
    ) -> Result<Vec<RemoteConfig>, AuthorityError> {
        (**self).list_configs(tenant, page_size)
    }

    fn publish_config(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        content: &str,
    ) -> Result<(), AuthorityError> {
        (**self).publish_config(tenant, group, data_id, content)
    }

    fn listen(
        &self,
        tenant: &str,
        group: &str,
        data_id: &str,
        md5: &str,
        timeout: Duration,
    ) -> Result<bool, AuthorityError> {
        (**self).listen(tenant, group, data_id, md5, timeout)
    }
}

//! Persistent settings at `~/.propsync/config.yaml`.
//!
//! # Storage layout
//!
//! ```text
//! ~/.propsync/
//!   config.yaml          (mode 0600)
//!   mirror/              (default snapshot repository location)
//!   data/commit.log      (append-only change reasons)
//!   logs/                (daemon logs)
//! ```
//!
//! Every field has a default, so a missing file or a partial file both load.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home, used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{ConfigKey, NamespaceIds, Stage, DEFAULT_GROUP, PUBLIC_NAMESPACE};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the configuration authority lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoritySettings {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub long_poll_timeout_ms: u64,
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8848,
            timeout_secs: 10,
            long_poll_timeout_ms: 30_000,
        }
    }
}

impl AuthoritySettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// On-disk arrangement of the snapshot mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `root/{namespace}/{group}/{data_id}`
    #[default]
    Hierarchical,
    /// `root/{data_id}+{group}+{namespace_id}`
    Flattened,
}

/// Byte representation of summary files in the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorEncoding {
    Utf8,
    /// Non-ASCII characters written as `\uXXXX`.
    #[default]
    AsciiEscaped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Defaults to `~/.propsync/mirror` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Cloned into `dir` when the mirror does not exist yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub layout: Layout,
    /// Remove entries missing from the authority on refresh.
    pub clean: bool,
    pub encoding: MirrorEncoding,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            dir: None,
            repo_url: None,
            layout: Layout::default(),
            clean: true,
            encoding: MirrorEncoding::default(),
        }
    }
}

/// Property keys holding database credentials in the shared `common` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialKeys {
    pub group: String,
    pub data_id: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for CredentialKeys {
    fn default() -> Self {
        Self {
            group: "SHARED".to_owned(),
            data_id: "common".to_owned(),
            host: "cloud.service.database.host".to_owned(),
            port: "cloud.service.database.port".to_owned(),
            user: "cloud.service.database.user".to_owned(),
            password: "cloud.service.database.password".to_owned(),
            database: "cloud.service.database.name".to_owned(),
        }
    }
}

/// One database table mirrored into the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Label used in logs and alerts.
    pub name: String,
    /// Data id of the snapshot in the [`ReconcileSettings::group`] group.
    pub data_id: String,
    /// Column whose value keys each row.
    pub key_column: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub stage: Stage,
    pub interval_secs: u64,
    pub group: String,
    /// Explicit connection URL; when unset credentials come from the authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub credentials: CredentialKeys,
    pub tables: Vec<TableSpec>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            stage: Stage::Ci,
            interval_secs: 60,
            group: "DATABASE".to_owned(),
            database_url: None,
            credentials: CredentialKeys::default(),
            tables: default_tables(),
        }
    }
}

fn default_tables() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: "device_type".to_owned(),
            data_id: "vesync-main.device-type".to_owned(),
            key_column: "config_model".to_owned(),
            query: "SELECT type, model, model_img, model_name, device_img, config_model, \
                    detail_table_name, device_brand, typeV2, category FROM device_type"
                .to_owned(),
        },
        TableSpec {
            name: "firmware_info".to_owned(),
            data_id: "vesync-main.firmware-info".to_owned(),
            key_column: "config_module".to_owned(),
            query: "SELECT f1.config_module, f1.firmware_version, f1.device_region, f1.firmware_url \
                    FROM firmware_info AS f1 \
                    INNER JOIN (SELECT max(version_code) AS max_version_code, config_module, \
                    device_region, plugin_name FROM firmware_info AS f2 \
                    GROUP BY f2.config_module, f2.device_region, f2.plugin_name) AS f3 \
                    ON f1.version_code = f3.max_version_code \
                    AND f1.config_module = f3.config_module \
                    AND f1.device_region = f3.device_region \
                    AND f1.plugin_name = f3.plugin_name"
                .to_owned(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// DingTalk robot webhook. Alerts go to the log when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    pub at_all: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            webhook: None,
            at_all: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub authority: AuthoritySettings,
    pub mirror: MirrorSettings,
    pub namespace_ids: NamespaceIds,
    /// Entry whose changes trigger a sync pass.
    pub trigger: ConfigKey,
    /// Entry holding the test-plan mapping document.
    pub test_plan_mapping: ConfigKey,
    pub reconcile: ReconcileSettings,
    pub alert: AlertSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authority: AuthoritySettings::default(),
            mirror: MirrorSettings::default(),
            namespace_ids: NamespaceIds::default(),
            trigger: ConfigKey::new(PUBLIC_NAMESPACE, DEFAULT_GROUP, "nacos.commit.message"),
            test_plan_mapping: ConfigKey::new(
                PUBLIC_NAMESPACE,
                DEFAULT_GROUP,
                "nacos.jmeter.test-plan",
            ),
            reconcile: ReconcileSettings::default(),
            alert: AlertSettings::default(),
        }
    }
}

impl Settings {
    /// Mirror directory, falling back to `<home>/.propsync/mirror`.
    pub fn mirror_dir_at(&self, home: &Path) -> PathBuf {
        self.mirror
            .dir
            .clone()
            .unwrap_or_else(|| propsync_root(home).join("mirror"))
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.propsync`
pub fn propsync_root(home: &Path) -> PathBuf {
    home.join(".propsync")
}

/// `<home>/.propsync/config.yaml` (no I/O)
pub fn config_path_at(home: &Path) -> PathBuf {
    propsync_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load settings; a missing file yields [`Settings::default`].
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

/// Atomically write settings: `.tmp` sibling, `chmod 0600`, `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<PathBuf, ConfigError> {
    let root = propsync_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, settings)
}

/// Home directory as reported by the platform.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

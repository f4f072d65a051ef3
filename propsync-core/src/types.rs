//! Domain types for configuration keys, stages and selection rules.
//!
//! The key hierarchy is fixed at three levels: namespace, group, data id.
//! Namespaces are always carried by their logical *name*; [`NamespaceIds`]
//! translates to and from the tenant ids the authority uses on the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Well-known groups and namespaces
// ---------------------------------------------------------------------------

/// Group holding properties shared by every device of a stage.
pub const SHARED_GROUP: &str = "SHARED";
/// Group holding per-device properties.
pub const DEVICE_GROUP: &str = "DEVICE";
/// Group holding per-device debug overrides.
pub const DEBUG_GROUP: &str = "DEBUG";
/// The single data id looked up in [`SHARED_GROUP`].
pub const COMMON_DATA_ID: &str = "common";

/// Namespace receiving the per-stage summary artifacts.
pub const SUMMARY_NAMESPACE: &str = "summary";
pub const SUMMARY_GROUP_STABLE: &str = "STABLE";
pub const SUMMARY_GROUP_DEBUG: &str = "DEBUG";

/// Logical name of the authority's default namespace (empty tenant id).
pub const PUBLIC_NAMESPACE: &str = "public";

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A deployment stage. Each stage owns the namespace of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ci,
    Testonline,
    Predeploy,
    Production,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Ci,
        Stage::Testonline,
        Stage::Predeploy,
        Stage::Production,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ci => "ci",
            Stage::Testonline => "testonline",
            Stage::Predeploy => "predeploy",
            Stage::Production => "production",
        }
    }

    pub fn namespace(self) -> Namespace {
        Namespace::from(self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidStage {
                stage: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A namespace a [`Rule`] may select from.
///
/// Other namespaces seen on the authority (`public`, `summary`, ...) are
/// addressed through plain strings in [`ConfigKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Namespace {
    #[serde(rename = "cross-env")]
    CrossEnv,
    #[serde(rename = "ci")]
    Ci,
    #[serde(rename = "testonline")]
    Testonline,
    #[serde(rename = "predeploy")]
    Predeploy,
    #[serde(rename = "production")]
    Production,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::CrossEnv => "cross-env",
            Namespace::Ci => "ci",
            Namespace::Testonline => "testonline",
            Namespace::Predeploy => "predeploy",
            Namespace::Production => "production",
        }
    }
}

impl From<Stage> for Namespace {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Ci => Namespace::Ci,
            Stage::Testonline => Namespace::Testonline,
            Stage::Predeploy => Namespace::Predeploy,
            Stage::Production => Namespace::Production,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "cross-env" {
            return Ok(Namespace::CrossEnv);
        }
        s.parse::<Stage>()
            .map(Namespace::from)
            .map_err(|_| ConfigError::UnknownNamespace { name: s.to_owned() })
    }
}

// ---------------------------------------------------------------------------
// ConfigKey
// ---------------------------------------------------------------------------

/// Address of one configuration entry.
///
/// Ordering is lexicographic over (namespace, group, data_id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub namespace: String,
    pub group: String,
    pub data_id: String,
}

impl ConfigKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        data_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            data_id: data_id.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.group, self.data_id)
    }
}

// ---------------------------------------------------------------------------
// NamespaceIds
// ---------------------------------------------------------------------------

/// Bidirectional table between logical namespace names and tenant ids.
///
/// Names and ids missing from the table map to themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceIds(BTreeMap<String, String>);

impl NamespaceIds {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        Self(table)
    }

    /// Tenant id for a logical name.
    pub fn id_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Logical name for a tenant id. The empty id is the default namespace.
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.0
            .iter()
            .find(|(_, v)| v.as_str() == id)
            .map(|(k, _)| k.as_str())
            .unwrap_or(if id.is_empty() { PUBLIC_NAMESPACE } else { id })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for NamespaceIds {
    fn default() -> Self {
        let table = [
            ("cross-env", "cross-env"),
            ("ci", "env-01"),
            ("testonline", "env-02"),
            ("predeploy", "env-03"),
            ("production", "env-04"),
            (PUBLIC_NAMESPACE, ""),
            (SUMMARY_NAMESPACE, "summary"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        Self(table)
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// One group of a rule and the data ids it selects, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub data_ids: Vec<String>,
}

/// Ordered selection of configuration keys for one job.
///
/// Groups are always `[SHARED, DEVICE]` followed by `DEBUG` when the rule was
/// built in debug mode. Entries selected later override earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub namespaces: Vec<Namespace>,
    pub groups: Vec<RuleGroup>,
}

impl Rule {
    /// Build the rule for a typed stage. See [`crate::selector::build_rule`].
    pub fn for_stage<I, S>(stage: Stage, identifiers: I, debug: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = identifiers.into_iter().map(Into::into).collect();
        let mut groups = vec![
            RuleGroup {
                name: SHARED_GROUP.to_owned(),
                data_ids: vec![COMMON_DATA_ID.to_owned()],
            },
            RuleGroup {
                name: DEVICE_GROUP.to_owned(),
                data_ids: ids.clone(),
            },
        ];
        if debug {
            groups.push(RuleGroup {
                name: DEBUG_GROUP.to_owned(),
                data_ids: ids,
            });
        }
        Self {
            namespaces: vec![Namespace::CrossEnv, stage.namespace()],
            groups,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.groups.iter().any(|g| g.name == DEBUG_GROUP)
    }

    /// Every key the rule selects, namespace-major, in priority order.
    pub fn keys(&self) -> impl Iterator<Item = ConfigKey> + '_ {
        self.namespaces.iter().flat_map(move |ns| {
            self.groups.iter().flat_map(move |group| {
                group
                    .data_ids
                    .iter()
                    .map(move |id| ConfigKey::new(ns.as_str(), group.name.as_str(), id.as_str()))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! propsync core library: domain types, rule selection, job identity,
//! test-plan mapping, settings and the authority seam.
//!
//! - [`types`]: keys, stages, namespaces and rules
//! - [`selector`]: [`build_rule`] and [`parse_job_identity`]
//! - [`testplan`]: [`TestPlanMapping`]
//! - [`settings`]: `~/.propsync/config.yaml` load / save
//! - [`authority`]: the [`ConfigAuthority`] trait
//! - [`error`]: [`ConfigError`]

pub mod authority;
pub mod error;
pub mod selector;
pub mod settings;
pub mod testplan;
pub mod types;

pub use authority::{AuthorityError, ConfigAuthority, NamespaceInfo, RemoteConfig};
pub use error::ConfigError;
pub use selector::{build_rule, parse_job_identity, JobIdentity};
pub use settings::{Layout, MirrorEncoding, Settings};
pub use testplan::{MappingEntry, PlanSelection, TestPlanMapping};
pub use types::{ConfigKey, Namespace, NamespaceIds, Rule, RuleGroup, Stage};

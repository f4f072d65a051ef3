//! Test-plan mapping: which test plans a job runs and which devices a test
//! plan targets.
//!
//! The mapping is a YAML document published on the authority. Keys are either
//! canonical job names (mapping to test plans) or test-plan paths (mapping to
//! device identifiers). Values are decoded explicitly into [`MappingEntry`]
//! instead of being inspected at every lookup:
//!
//! ```yaml
//! fullTest-Core400S-Cloud-API: api/core400s.jmx          # Single
//! smoke: [api/a.jmx, api/b.jmx]                          # Multiple
//! nightly:                                               # PerStage
//!   ci: api/ci-only.jmx
//!   production: [api/p1.jmx, api/p2.jmx]
//!   testplans: api/fallback.jmx
//!   parallel: true
//! api/core400s.jmx: [core400s, core300s]                 # devices
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::Value;

use crate::error::ConfigError;
use crate::selector::JobIdentity;
use crate::types::Stage;

/// One decoded mapping value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MappingEntry {
    Single(String),
    Multiple(Vec<String>),
    PerStage {
        stages: BTreeMap<Stage, Vec<String>>,
        testplans: Option<Vec<String>>,
        parallel: bool,
    },
}

/// Test plans selected for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSelection {
    pub plans: Vec<String>,
    pub parallel: bool,
}

/// Decoded mapping document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestPlanMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl TestPlanMapping {
    /// Decode and validate a mapping document.
    ///
    /// Every path must be relative. Object entries may only carry stage
    /// tokens, `testplans` and a boolean `parallel`.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(text)?;
        let map = match root {
            Value::Mapping(map) => map,
            Value::Null => return Ok(Self::default()),
            _ => {
                return Err(ConfigError::InvalidMapping {
                    key: "<root>".to_owned(),
                    reason: "document must be a mapping".to_owned(),
                })
            }
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            let key = scalar_key(&key)?;
            let entry = decode_entry(&key, value)?;
            entries.insert(key, entry);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&MappingEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test plans for a job, looked up by its canonical name.
    ///
    /// Per-stage entries fall back to `testplans` when the job's stage has no
    /// entry of its own.
    pub fn plans_for(&self, job: &JobIdentity) -> Result<PlanSelection, ConfigError> {
        let key = job.canonical_name.as_str();
        let entry = self.entries.get(key).ok_or_else(|| ConfigError::MappingNotFound {
            key: key.to_owned(),
        })?;
        match entry {
            MappingEntry::Single(plan) => Ok(PlanSelection {
                plans: vec![plan.clone()],
                parallel: false,
            }),
            MappingEntry::Multiple(plans) => Ok(PlanSelection {
                plans: plans.clone(),
                parallel: false,
            }),
            MappingEntry::PerStage {
                stages,
                testplans,
                parallel,
            } => {
                let plans = stages
                    .get(&job.stage)
                    .or(testplans.as_ref())
                    .cloned()
                    .ok_or_else(|| ConfigError::InvalidMapping {
                        key: key.to_owned(),
                        reason: format!("no test plans for stage {}", job.stage),
                    })?;
                Ok(PlanSelection {
                    plans,
                    parallel: *parallel,
                })
            }
        }
    }

    /// Device identifiers targeted by a test plan.
    pub fn devices_for(&self, plan: &str) -> Result<Vec<String>, ConfigError> {
        match self.entries.get(plan) {
            None => Err(ConfigError::MappingNotFound {
                key: plan.to_owned(),
            }),
            Some(MappingEntry::Single(device)) => Ok(vec![device.clone()]),
            Some(MappingEntry::Multiple(devices)) => Ok(devices.clone()),
            Some(MappingEntry::PerStage { .. }) => Err(ConfigError::InvalidMapping {
                key: plan.to_owned(),
                reason: "devices can only be a string or a list".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn scalar_key(key: &Value) -> Result<String, ConfigError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::InvalidMapping {
            key: format!("{other:?}"),
            reason: "keys must be scalars".to_owned(),
        }),
    }
}

fn decode_entry(key: &str, value: Value) -> Result<MappingEntry, ConfigError> {
    match value {
        Value::Mapping(map) => {
            let mut stages = BTreeMap::new();
            let mut testplans = None;
            let mut parallel = false;
            for (field, field_value) in map {
                let field = scalar_key(&field)?;
                match field.as_str() {
                    "testplans" => testplans = Some(decode_paths(key, field_value)?),
                    "parallel" => {
                        parallel = field_value.as_bool().ok_or_else(|| {
                            ConfigError::InvalidMapping {
                                key: key.to_owned(),
                                reason: "'parallel' must be a boolean".to_owned(),
                            }
                        })?;
                    }
                    other => {
                        let stage: Stage =
                            other.parse().map_err(|_| ConfigError::InvalidMapping {
                                key: key.to_owned(),
                                reason: format!("unexpected field '{other}'"),
                            })?;
                        stages.insert(stage, decode_paths(key, field_value)?);
                    }
                }
            }
            Ok(MappingEntry::PerStage {
                stages,
                testplans,
                parallel,
            })
        }
        Value::Sequence(_) => decode_paths(key, value).map(MappingEntry::Multiple),
        Value::String(path) => {
            check_relative(key, &path)?;
            Ok(MappingEntry::Single(path))
        }
        _ => Err(ConfigError::InvalidMapping {
            key: key.to_owned(),
            reason: "value can only be a string, a list or a mapping".to_owned(),
        }),
    }
}

fn decode_paths(key: &str, value: Value) -> Result<Vec<String>, ConfigError> {
    let paths = match value {
        Value::String(s) => vec![s],
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(ConfigError::InvalidMapping {
                    key: key.to_owned(),
                    reason: "list items must be strings".to_owned(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(ConfigError::InvalidMapping {
                key: key.to_owned(),
                reason: "expected a string or a list of strings".to_owned(),
            })
        }
    };
    for path in &paths {
        check_relative(key, path)?;
    }
    Ok(paths)
}

fn check_relative(key: &str, path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') {
        return Err(ConfigError::AbsolutePath {
            key: key.to_owned(),
            path: path.to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::parse_job_identity;

    const DOC: &str = r#"
fullTest-Core400S-Cloud-API: api/core400s.jmx
smoke: [api/a.jmx, api/b.jmx]
nightly:
  ci: api/ci-only.jmx
  production: [api/p1.jmx, api/p2.jmx]
  testplans: api/fallback.jmx
  parallel: true
api/core400s.jmx: [core400s, core300s]
api/a.jmx: lv600s
"#;

    fn mapping() -> TestPlanMapping {
        TestPlanMapping::from_yaml(DOC).expect("decode")
    }

    #[test]
    fn decodes_every_shape() {
        let m = mapping();
        assert_eq!(m.len(), 5);
        assert!(matches!(m.get("fullTest-Core400S-Cloud-API"), Some(MappingEntry::Single(_))));
        assert!(matches!(m.get("smoke"), Some(MappingEntry::Multiple(p)) if p.len() == 2));
        assert!(matches!(
            m.get("nightly"),
            Some(MappingEntry::PerStage { parallel: true, .. })
        ));
    }

    #[test]
    fn plans_for_single_job() {
        let job = parse_job_identity("debug-fullTest-Core400S-Cloud-API-ci").unwrap();
        let selection = mapping().plans_for(&job).unwrap();
        assert_eq!(selection.plans, vec!["api/core400s.jmx"]);
        assert!(!selection.parallel);
    }

    #[test]
    fn plans_for_per_stage_job_uses_stage_then_fallback() {
        let m = mapping();
        let prod = parse_job_identity("nightly-production").unwrap();
        assert_eq!(m.plans_for(&prod).unwrap().plans, vec!["api/p1.jmx", "api/p2.jmx"]);

        let predeploy = parse_job_identity("nightly-predeploy").unwrap();
        let selection = m.plans_for(&predeploy).unwrap();
        assert_eq!(selection.plans, vec!["api/fallback.jmx"]);
        assert!(selection.parallel);
    }

    #[test]
    fn per_stage_without_fallback_fails_for_missing_stage() {
        let m = TestPlanMapping::from_yaml("nightly:\n  ci: a.jmx\n").unwrap();
        let job = parse_job_identity("nightly-testonline").unwrap();
        assert!(matches!(m.plans_for(&job), Err(ConfigError::InvalidMapping { .. })));
    }

    #[test]
    fn missing_job_is_mapping_not_found() {
        let job = parse_job_identity("unknown-ci").unwrap();
        let err = mapping().plans_for(&job).unwrap_err();
        assert!(matches!(err, ConfigError::MappingNotFound { ref key } if key == "unknown"));
    }

    #[test]
    fn devices_for_plan() {
        let m = mapping();
        assert_eq!(m.devices_for("api/core400s.jmx").unwrap(), vec!["core400s", "core300s"]);
        assert_eq!(m.devices_for("api/a.jmx").unwrap(), vec!["lv600s"]);
        assert!(matches!(m.devices_for("nightly"), Err(ConfigError::InvalidMapping { .. })));
        assert!(matches!(m.devices_for("api/none.jmx"), Err(ConfigError::MappingNotFound { .. })));
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let err = TestPlanMapping::from_yaml("job: /abs/plan.jmx\n").unwrap_err();
        assert!(matches!(err, ConfigError::AbsolutePath { .. }));

        let err = TestPlanMapping::from_yaml("job:\n  ci: [ok.jmx, /abs.jmx]\n").unwrap_err();
        assert!(matches!(err, ConfigError::AbsolutePath { ref path, .. } if path == "/abs.jmx"));
    }

    #[test]
    fn unknown_fields_and_bad_parallel_are_rejected() {
        let err = TestPlanMapping::from_yaml("job:\n  staging: a.jmx\n").unwrap_err();
        assert!(err.to_string().contains("unexpected field 'staging'"));

        let err = TestPlanMapping::from_yaml("job:\n  ci: a.jmx\n  parallel: yes-please\n")
            .unwrap_err();
        assert!(err.to_string().contains("parallel"));
    }

    #[test]
    fn empty_document_is_empty_mapping() {
        assert!(TestPlanMapping::from_yaml("").unwrap().is_empty());
    }
}

//! Job preparation: from a CI job name to one concatenated properties file
//! per test plan.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use propsync_core::{parse_job_identity, ConfigKey, JobIdentity, Rule, TestPlanMapping};

use crate::aggregate::concatenate;
use crate::error::{io_err, SnapshotError};
use crate::index::SnapshotIndex;
use crate::resolver::{resolve, Bundle};

/// Read the test-plan mapping stored in the mirror under `key`.
pub fn load_mapping(index: &dyn SnapshotIndex, key: &ConfigKey) -> Result<TestPlanMapping, SnapshotError> {
    let path = index.path_of(key);
    if !path.is_file() {
        return Err(SnapshotError::Config(propsync_core::ConfigError::MappingNotFound {
            key: key.to_string(),
        }));
    }
    let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(TestPlanMapping::from_yaml(&text)?)
}

/// One prepared test plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedPlan {
    pub plan: String,
    pub devices: Vec<String>,
    pub bundle: Bundle,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: JobIdentity,
    /// Whether the plans may run concurrently.
    pub parallel: bool,
    pub plans: Vec<PreparedPlan>,
}

/// Resolve and concatenate the properties of every test plan of `job_name`
/// into `out_dir/<plan stem>.properties`.
pub fn prepare_job(
    job_name: &str,
    index: &dyn SnapshotIndex,
    mapping: &TestPlanMapping,
    out_dir: &Path,
) -> Result<JobReport, SnapshotError> {
    let job = parse_job_identity(job_name)?;
    let selection = mapping.plans_for(&job)?;
    tracing::info!(
        "job {} -> {} test plan(s) on {} (debug: {})",
        job.canonical_name,
        selection.plans.len(),
        job.stage,
        job.is_debug
    );

    fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

    let mut plans = Vec::with_capacity(selection.plans.len());
    for plan in &selection.plans {
        let devices = mapping.devices_for(plan)?;
        let rule = Rule::for_stage(job.stage, devices.iter().cloned(), job.is_debug);
        let bundle = resolve(&rule, index);
        let output = out_dir.join(format!("{}.properties", plan_stem(plan)));
        concatenate(&bundle.paths(), &output, None)?;
        tracing::info!("collected {} file(s) for {plan}", bundle.len());
        plans.push(PreparedPlan {
            plan: plan.clone(),
            devices,
            bundle,
            output,
        });
    }

    Ok(JobReport {
        job,
        parallel: selection.parallel,
        plans,
    })
}

/// `fullTest/Core400S.jmx` -> `Core400S`
fn plan_stem(plan: &str) -> String {
    Path::new(plan)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| plan.to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::split_sources;
    use crate::index::HierarchicalIndex;
    use rstest::rstest;
    use tempfile::TempDir;

    const MAPPING: &str = "\
fullTest-Core400S:
  - fullTest/Core400S.jmx
  - fullTest/Core400S-extra.jmx
smoke:
  ci: [smoke/ci.jmx]
  testplans: [smoke/all.jmx]
  parallel: true
fullTest/Core400S.jmx: core400s
fullTest/Core400S-extra.jmx: [core400s, core300s]
smoke/ci.jmx: core400s
smoke/all.jmx: core300s
";

    fn mirror() -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (rel, content) in [
            ("cross-env/SHARED/common", "a=1\n"),
            ("ci/DEVICE/core400s", "d=400\n"),
            ("ci/DEVICE/core300s", "d=300\n"),
            ("ci/DEBUG/core400s", "debug=true\n"),
            ("public/DEFAULT_GROUP/nacos.jmeter.test-plan", MAPPING),
        ] {
            let path = tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        tmp
    }

    #[rstest]
    #[case("fullTest/Core400S.jmx", "Core400S")]
    #[case("plain", "plain")]
    #[case("a/b/c.d.jmx", "c.d")]
    fn stems(#[case] plan: &str, #[case] stem: &str) {
        assert_eq!(plan_stem(plan), stem);
    }

    #[test]
    fn prepares_one_file_per_plan() {
        let tmp = mirror();
        let index = HierarchicalIndex::open(tmp.path()).unwrap();
        let mapping = load_mapping(
            &index,
            &ConfigKey::new("public", "DEFAULT_GROUP", "nacos.jmeter.test-plan"),
        )
        .unwrap();
        let out = TempDir::new().unwrap();

        let report = prepare_job("debug-fullTest-Core400S-ci", &index, &mapping, out.path()).unwrap();
        assert!(!report.parallel);
        assert_eq!(report.plans.len(), 2);

        let first = fs::read(out.path().join("Core400S.properties")).unwrap();
        let contents: Vec<_> = split_sources(&first).iter().map(|s| s.text().into_owned()).collect();
        assert_eq!(contents, vec!["a=1\n", "d=400\n", "debug=true\n"]);

        assert_eq!(report.plans[1].devices, vec!["core400s", "core300s"]);
        assert!(out.path().join("Core400S-extra.properties").exists());
    }

    #[test]
    fn per_stage_entry_falls_back_and_reports_parallel() {
        let tmp = mirror();
        let index = HierarchicalIndex::open(tmp.path()).unwrap();
        let mapping = TestPlanMapping::from_yaml(MAPPING).unwrap();
        let out = TempDir::new().unwrap();

        let ci = prepare_job("smoke-ci", &index, &mapping, out.path()).unwrap();
        assert!(ci.parallel);
        assert_eq!(ci.plans[0].plan, "smoke/ci.jmx");

        let prod = prepare_job("regression_smoke_production", &index, &mapping, out.path()).unwrap();
        assert_eq!(prod.plans[0].plan, "smoke/all.jmx");
        assert_eq!(prod.plans[0].bundle.len(), 1);
    }

    #[test]
    fn unknown_job_is_a_mapping_error() {
        let tmp = mirror();
        let index = HierarchicalIndex::open(tmp.path()).unwrap();
        let mapping = TestPlanMapping::from_yaml(MAPPING).unwrap();
        let out = TempDir::new().unwrap();
        let err = prepare_job("nothing-ci", &index, &mapping, out.path()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Config(propsync_core::ConfigError::MappingNotFound { .. })
        ));
    }
}

//! Settings error-message, atomic-save and mapping integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use propsync_core::{
    parse_job_identity, settings, ConfigError, Layout, Settings, Stage, TestPlanMapping,
};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn corrupt_settings_return_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".propsync/config.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must name the file: {err}");
}

#[test]
fn wrong_type_settings_return_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".propsync/config.yaml")
        .write_str("- this is a list, not a mapping\n")
        .expect("write");

    let err = settings::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn invalid_stage_in_settings_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".propsync/config.yaml")
        .write_str("reconcile:\n  stage: staging\n")
        .expect("write");

    assert!(matches!(
        settings::load_at(home.path()),
        Err(ConfigError::Parse { .. })
    ));
}

// ---------------------------------------------------------------------------
// 2. Atomic save
// ---------------------------------------------------------------------------

#[test]
fn save_creates_file_and_leaves_no_tmp() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut s = Settings::default();
    s.mirror.layout = Layout::Flattened;
    s.reconcile.stage = Stage::Testonline;
    settings::save_at(home.path(), &s).expect("save");

    home.child(".propsync/config.yaml")
        .assert(predicate::path::exists());
    home.child(".propsync/config.yaml")
        .assert(predicate::str::contains("layout: flattened"));
    home.child(".propsync/config.yaml.tmp")
        .assert(predicate::path::missing());

    let loaded = settings::load_at(home.path()).expect("load");
    assert_eq!(loaded.reconcile.stage, Stage::Testonline);
}

// ---------------------------------------------------------------------------
// 3. Job identity flowing into the mapping
// ---------------------------------------------------------------------------

#[test]
fn job_to_plans_to_devices() {
    let mapping = TestPlanMapping::from_yaml(
        "fullTest-Core400S:\n  testonline: [api/core400s.jmx]\n  parallel: false\n\
         api/core400s.jmx: [core400s, core300s]\n",
    )
    .expect("mapping");

    let job = parse_job_identity("regression-fullTest-Core400S-TestOnline").expect("job");
    assert_eq!(job.stage, Stage::Testonline);

    let selection = mapping.plans_for(&job).expect("plans");
    let devices = mapping.devices_for(&selection.plans[0]).expect("devices");
    assert_eq!(devices, vec!["core400s", "core300s"]);
}

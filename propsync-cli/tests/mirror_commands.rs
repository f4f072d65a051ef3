use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use propsync_core::{settings, Layout};

fn propsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("propsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

const MAPPING: &str = "\
fullTest-Core400S-Cloud-API: [api/core400s.jmx, api/shared.jmx]
api/core400s.jmx: core400s
api/shared.jmx: [core400s, core300s]
";

fn seed_mirror(mirror: &Path) {
    for (rel, content) in [
        ("cross-env/SHARED/common", "db.host=shared\n"),
        ("ci/SHARED/common", "db.host=ci\n"),
        ("ci/DEVICE/core400s", "device=core400s\n"),
        ("ci/DEVICE/core300s", "device=core300s\n"),
        ("ci/DEBUG/core400s", "debug=on\n"),
        ("public/DEFAULT_GROUP/nacos.jmeter.test-plan", MAPPING),
    ] {
        let path = mirror.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }
}

/// Home with a config pointing at a seeded hierarchical mirror.
fn prepared_home() -> (TempDir, PathBuf) {
    let home = TempDir::new().expect("home");
    let mirror = home.path().join("mirror");
    seed_mirror(&mirror);
    propsync_cmd(home.path())
        .args(["init", "--mirror"])
        .arg(&mirror)
        .assert()
        .success();
    (home, mirror)
}

#[test]
fn init_writes_config_and_respects_existing_file() {
    let home = TempDir::new().expect("home");

    propsync_cmd(home.path())
        .args(["init", "--host", "nacos.internal", "--port", "8858", "--layout", "flattened"])
        .assert()
        .success()
        .stdout(contains("http://nacos.internal:8858"));

    let loaded = settings::load_at(home.path()).expect("load");
    assert_eq!(loaded.authority.host, "nacos.internal");
    assert_eq!(loaded.authority.port, 8858);
    assert_eq!(loaded.mirror.layout, Layout::Flattened);

    propsync_cmd(home.path())
        .args(["init", "--host", "other"])
        .assert()
        .success()
        .stdout(contains("already exists"));
    assert_eq!(settings::load_at(home.path()).unwrap().authority.host, "nacos.internal");

    propsync_cmd(home.path())
        .args(["init", "--force", "--host", "other"])
        .assert()
        .success();
    assert_eq!(settings::load_at(home.path()).unwrap().authority.host, "other");
}

#[test]
fn entries_lists_stage_entries_in_override_order() {
    let (home, _mirror) = prepared_home();

    let assert = propsync_cmd(home.path())
        .args(["entries", "--stage", "ci", "--json"])
        .assert()
        .success();
    let keys: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json");
    let rendered: Vec<String> = keys
        .as_array()
        .unwrap()
        .iter()
        .map(|k| format!("{}/{}/{}", k["namespace"].as_str().unwrap(), k["group"].as_str().unwrap(), k["data_id"].as_str().unwrap()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            "cross-env/SHARED/common",
            "ci/SHARED/common",
            "ci/DEVICE/core300s",
            "ci/DEVICE/core400s",
        ]
    );

    propsync_cmd(home.path())
        .arg("entries")
        .assert()
        .success()
        .stdout(contains("nacos.jmeter.test-plan"))
        .stdout(contains("6 entries"));
}

#[test]
fn resolve_writes_sectioned_document_in_rule_order() {
    let (home, _mirror) = prepared_home();
    let out = home.path().join("out/all.properties");

    propsync_cmd(home.path())
        .args(["resolve", "--stage", "ci", "--device", "core400s", "--debug", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("ci/DEBUG/core400s"));

    let doc = fs::read_to_string(&out).expect("document");
    assert!(doc.starts_with("# all properties collected from Nacos snapshot"));
    let shared = doc.find("db.host=shared").unwrap();
    let ci = doc.find("db.host=ci").unwrap();
    let device = doc.find("device=core400s").unwrap();
    let debug = doc.find("debug=on").unwrap();
    assert!(shared < ci && ci < device && device < debug);
    assert!(!doc.contains("core300s"));
}

#[test]
fn resolve_merged_keeps_last_definition() {
    let (home, _mirror) = prepared_home();
    let out = home.path().join("merged.properties");

    propsync_cmd(home.path())
        .args(["resolve", "-s", "ci", "-d", "core400s", "--merged", "--echo", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("db.host=ci"));

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("db.host=ci"));
    assert!(!text.contains("db.host=shared"));
    assert!(text.contains("device=core400s"));
}

#[test]
fn resolve_with_unknown_stage_fails() {
    let (home, _mirror) = prepared_home();

    propsync_cmd(home.path())
        .args(["resolve", "--stage", "staging", "--device", "core400s"])
        .assert()
        .failure()
        .stderr(contains("staging"));
}

#[test]
fn collect_writes_one_file_per_test_plan() {
    let (home, _mirror) = prepared_home();
    let workspace = home.path().join("workspace");

    let assert = propsync_cmd(home.path())
        .args(["collect", "debug-fullTest-Core400S-Cloud-API-ci", "--json", "--out"])
        .arg(&workspace)
        .assert()
        .success();
    let report: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json");
    assert_eq!(report["job"]["canonical_name"], "fullTest-Core400S-Cloud-API");
    assert_eq!(report["parallel"], false);
    assert_eq!(report["plans"].as_array().unwrap().len(), 2);

    let core400s = fs::read_to_string(workspace.join("core400s.properties")).unwrap();
    assert!(core400s.contains("debug=on"));
    assert!(!core400s.contains("device=core300s"));
    let shared = fs::read_to_string(workspace.join("shared.properties")).unwrap();
    assert!(shared.contains("device=core300s"));
    assert!(shared.contains("device=core400s"));
}

#[test]
fn collect_unknown_job_fails() {
    let (home, _mirror) = prepared_home();

    propsync_cmd(home.path())
        .args(["collect", "nightly-ci", "--out"])
        .arg(home.path().join("ws"))
        .assert()
        .failure()
        .stderr(contains("nightly"));
}

#[test]
fn summary_dry_run_leaves_mirror_untouched() {
    let (home, mirror) = prepared_home();

    propsync_cmd(home.path())
        .args(["summary", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would write"));
    assert!(!mirror.join("summary").exists());

    propsync_cmd(home.path())
        .arg("summary")
        .assert()
        .success()
        .stdout(contains("written"));
    assert!(mirror.join("summary/STABLE").is_dir());
    assert!(mirror.join("summary/DEBUG").is_dir());
}

#[test]
fn daemon_logs_reports_missing_file() {
    let home = TempDir::new().expect("home");

    propsync_cmd(home.path())
        .args(["daemon", "logs", "--reconcile"])
        .assert()
        .success()
        .stdout(contains("log file not found"))
        .stdout(contains("reconcile.log"));
}

#[test]
fn daemon_logs_prints_tail() {
    let home = TempDir::new().expect("home");
    let log = home.path().join(".propsync/logs/sync.log");
    fs::create_dir_all(log.parent().unwrap()).unwrap();
    fs::write(&log, "one\ntwo\nthree\n").unwrap();

    let assert = propsync_cmd(home.path())
        .args(["daemon", "logs", "--lines", "2"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("==> ") && lines[0].ends_with("sync.log <=="));
    assert_eq!(&lines[1..], ["two", "three"]);
}

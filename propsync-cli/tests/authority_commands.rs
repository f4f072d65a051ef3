use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};

fn propsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("propsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

/// Fake Nacos answering from a fixed table of `(tenant, group, data id, content)`.
/// Tenants follow the default namespace ids (`ci` is `env-01`).
struct FakeNacos {
    port: u16,
    server: Arc<Server>,
}

const ENTRIES: &[(&str, &str, &str, &str)] = &[
    ("cross-env", "SHARED", "common", "db.host=shared\n"),
    ("env-01", "DEVICE", "core400s", "device=core400s\n"),
    ("env-01", "DEBUG", "core400s", "debug=on\n"),
];

impl FakeNacos {
    fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        {
            let server = server.clone();
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let (status, body) = answer(request.url());
                    let json = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                    let _ = request.respond(
                        Response::from_string(body)
                            .with_status_code(status)
                            .with_header(json),
                    );
                }
            });
        }
        Self { port, server }
    }
}

impl Drop for FakeNacos {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

fn answer(url: &str) -> (u16, String) {
    if url == "/nacos/" {
        return (200, "ok".to_owned());
    }
    if url.starts_with("/nacos/v1/console/namespaces") {
        return (
            200,
            r#"{"code":200,"data":[
                {"namespace":"cross-env","namespaceShowName":"cross-env","configCount":1},
                {"namespace":"env-01","namespaceShowName":"ci","configCount":2}
            ]}"#
            .to_owned(),
        );
    }
    if url.contains("search=accurate") {
        let items: Vec<String> = ENTRIES
            .iter()
            .filter(|(tenant, ..)| url.contains(&format!("tenant={tenant}")))
            .map(|(tenant, group, data_id, content)| {
                serde_json::json!({
                    "dataId": data_id,
                    "group": group,
                    "content": content,
                    "tenant": tenant,
                })
                .to_string()
            })
            .collect();
        return (
            200,
            format!(
                r#"{{"totalCount":{},"pageNumber":1,"pagesAvailable":1,"pageItems":[{}]}}"#,
                items.len(),
                items.join(",")
            ),
        );
    }
    for (tenant, group, data_id, content) in ENTRIES {
        if url.contains(&format!("tenant={tenant}&"))
            && url.contains(&format!("group={group}&"))
            && url.ends_with(&format!("dataId={data_id}"))
        {
            return (200, (*content).to_owned());
        }
    }
    (404, "config data not exist".to_owned())
}

fn home_for(nacos: &FakeNacos) -> TempDir {
    let home = TempDir::new().expect("home");
    propsync_cmd(home.path())
        .args(["init", "--host", "127.0.0.1", "--port", &nacos.port.to_string()])
        .assert()
        .success();
    home
}

#[test]
fn fetch_resolves_against_the_authority_and_persists_hits() {
    let nacos = FakeNacos::start();
    let home = home_for(&nacos);
    let dest = home.path().join("fetched");

    let assert = propsync_cmd(home.path())
        .args(["fetch", "--stage", "ci", "--device", "core400s", "--json", "--dest"])
        .arg(&dest)
        .assert()
        .success();
    let hits: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json");
    let keys: Vec<&str> = hits
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["cross-env/SHARED/common", "ci/DEVICE/core400s"]);

    assert_eq!(
        fs::read_to_string(dest.join("ci/DEVICE/core400s")).unwrap(),
        "device=core400s\n"
    );
    assert!(!dest.join("ci/DEBUG").exists());
}

#[test]
fn fetch_with_debug_adds_debug_entry() {
    let nacos = FakeNacos::start();
    let home = home_for(&nacos);

    propsync_cmd(home.path())
        .args(["fetch", "-s", "ci", "-d", "core400s", "--debug"])
        .assert()
        .success()
        .stdout(contains("ci/DEBUG/core400s"))
        .stdout(contains("3 entries fetched"));
}

#[test]
fn snapshot_populates_the_mirror() {
    let nacos = FakeNacos::start();
    let home = home_for(&nacos);

    propsync_cmd(home.path())
        .arg("snapshot")
        .assert()
        .success()
        .stdout(contains("3 fetched, 3 written"));

    let mirror = home.path().join(".propsync/mirror");
    assert_eq!(
        fs::read_to_string(mirror.join("cross-env/SHARED/common")).unwrap(),
        "db.host=shared\n"
    );
    assert!(mirror.join("ci/DEBUG/core400s").is_file());

    propsync_cmd(home.path())
        .arg("snapshot")
        .assert()
        .success()
        .stdout(contains("0 written, 3 unchanged"));
}

#[test]
fn offline_authority_fails_fetch() {
    let home = TempDir::new().expect("home");
    let port = {
        let unused = Server::http("127.0.0.1:0").unwrap();
        unused.server_addr().to_ip().unwrap().port()
    };
    propsync_cmd(home.path())
        .args(["init", "--host", "127.0.0.1", "--port", &port.to_string()])
        .assert()
        .success();

    propsync_cmd(home.path())
        .args(["fetch", "--stage", "ci", "--device", "core400s"])
        .assert()
        .failure()
        .stderr(contains("offline"));
}

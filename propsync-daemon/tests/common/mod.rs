#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "propsync test"]);
    git(dir, &["config", "user.email", "propsync@example.invalid"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Bare repository with one commit, at `<root>/remote.git`.
pub fn seeded_remote(root: &Path) -> PathBuf {
    let seed = root.join("seed");
    fs::create_dir_all(&seed).unwrap();
    git(&seed, &["init", "-q"]);
    configure_identity(&seed);
    fs::write(seed.join("README"), "mirror\n").unwrap();
    git(&seed, &["add", "-A"]);
    git(&seed, &["commit", "-q", "-m", "init"]);
    git(root, &["clone", "-q", "--bare", "seed", "remote.git"]);
    root.join("remote.git")
}

pub fn clone_into(root: &Path, remote: &Path, name: &str) -> PathBuf {
    git(root, &["clone", "-q", &remote.to_string_lossy(), name]);
    let dir = root.join(name);
    configure_identity(&dir);
    dir
}

/// Commit subjects of the remote, newest first.
pub fn remote_log(remote: &Path) -> Vec<String> {
    git(remote, &["log", "--format=%B"])
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

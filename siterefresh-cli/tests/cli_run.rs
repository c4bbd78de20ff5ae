use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// `siterefresh` with an isolated home and none of the ambient overrides.
fn siterefresh(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("siterefresh").expect("binary built");
    cmd.current_dir(cwd).env("HOME", home).env("USERPROFILE", home);
    for var in [
        "BASE_URL",
        "SITEREFRESH_MODE",
        "SITEREFRESH_ROOT",
        "SITEREFRESH_CONTENT_DIR",
        "SITEREFRESH_SYNC_DIR",
        "SITEREFRESH_STAGE_TIMEOUT_SECS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// A site root with a sync tool dir and a config file using shell stand-ins.
fn site(build: &str) -> (TempDir, std::path::PathBuf) {
    let root = TempDir::new().expect("site");
    fs::create_dir_all(root.path().join("cmd").join("xmlsync")).expect("sync dir");
    let config = root.path().join("refresh.yaml");
    let yaml = format!(
        "sync_command: [\"sh\", \"-c\", \"touch synced\"]\nbuild_command: [\"sh\", \"-c\", {build:?}]\n"
    );
    fs::write(&config, yaml).expect("config");
    (root, config)
}

#[test]
fn config_prints_resolved_defaults() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("site");

    siterefresh(home.path(), root.path())
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"base_url\": \"https://estate-index.vercel.app/\""))
        .stdout(predicate::str::contains("\"mode\": \"production\""))
        .stdout(predicate::str::contains("listings"));
}

#[test]
fn config_rejects_bad_base_url() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("site");

    siterefresh(home.path(), root.path())
        .args(["config", "--base-url", "ftp://example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BASE_URL"));
}

#[test]
fn run_syncs_then_builds_and_reports_success() {
    let home = TempDir::new().expect("home");
    let (root, config) = site("touch built");

    let assert = siterefresh(home.path(), root.path())
        .args(["run", "--json", "--config"])
        .arg(&config)
        .assert()
        .success();
    let response: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("response JSON on stdout");

    assert_eq!(response["status"], 200);
    assert_eq!(response["body"]["success"], true);
    assert!(response["body"]["duration"].as_str().unwrap().ends_with('s'));
    assert!(root.path().join("cmd/xmlsync/synced").exists());
    assert!(root.path().join("built").exists());
}

#[test]
fn run_with_wrong_marker_is_unauthorized_and_runs_nothing() {
    let home = TempDir::new().expect("home");
    let (root, config) = site("touch built");

    siterefresh(home.path(), root.path())
        .args(["run", "-H", "x-trigger=false", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Unauthorized"));
    assert!(!root.path().join("cmd/xmlsync/synced").exists());
    assert!(!root.path().join("built").exists());
}

#[test]
fn run_surfaces_build_failure_details() {
    let home = TempDir::new().expect("home");
    let (root, config) = site("echo 'hugo: template render error' >&2; exit 1");

    siterefresh(home.path(), root.path())
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Build failed"))
        .stdout(predicate::str::contains("template render error"));
}

#[test]
fn history_without_daemon_says_so() {
    let home = TempDir::new().expect("home");

    siterefresh(home.path(), home.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon is not running"));
}

//! E2E CLI tests: init, quota periods and read-only reports.
//!
//! Each test runs the `tally` binary as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn tally_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.current_dir(dir);
    cmd.env("TALLY_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn init_project(dir: &Path) {
    tally_cmd(dir).args(["init"]).assert().success();
    std::fs::write(
        dir.join(".tally/config.toml"),
        "[[staff.members]]\nid = \"100\"\nname = \"alice\"\n\n[[staff.members]]\nid = \"101\"\nname = \"bob\"\n",
    )
    .expect("write roster");
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = tally_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn init_creates_state_and_refuses_to_repeat() {
    let dir = TempDir::new().unwrap();
    tally_cmd(dir.path()).args(["init"]).assert().success();

    assert!(dir.path().join(".tally/config.toml").exists());
    assert!(dir.path().join(".tally/data.json").exists());
    assert!(dir.path().join(".tally/scheduled_closures.json").exists());

    tally_cmd(dir.path())
        .args(["init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    tally_cmd(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    tally_cmd(dir.path())
        .args(["stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn quota_period_round_trip() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    let started = json_of(dir.path(), &["quota", "start", "10"]);
    assert_eq!(started["target"], 10);

    let status = json_of(dir.path(), &["quota", "status"]);
    assert_eq!(status["target"], 10);
    let standings = status["standings"].as_array().expect("standings array");
    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0]["monthlyTickets"], 0);

    let ended = json_of(dir.path(), &["quota", "end"]);
    assert_eq!(ended["target"], 10);
    assert!(ended["staffResults"]["100"].is_object());

    let history = json_of(dir.path(), &["quota", "history"]);
    let rows = history.as_array().expect("history array");
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["id"].as_str().unwrap().starts_with("quota_"));
}

#[test]
fn ending_without_a_period_reports_the_code() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    let output = tally_cmd(dir.path())
        .args(["quota", "end", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(err["error"]["error_code"], "E5001");
    assert!(err["error"]["suggestion"].is_string());
}

#[test]
fn invalid_targets_are_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    for target in ["0", "-5"] {
        tally_cmd(dir.path())
            .args(["quota", "start", target])
            .assert()
            .failure()
            .stderr(predicate::str::contains("E3001"));
    }
    tally_cmd(dir.path())
        .args(["quota", "start", "ten"])
        .assert()
        .failure();
}

#[test]
fn reports_on_fresh_state() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    let stats = json_of(dir.path(), &["stats"]);
    assert_eq!(stats["leaderboard"].as_array().map(Vec::len), Some(2));
    assert_eq!(stats["openTickets"], 0);
    assert_eq!(stats["tags"]["priorities"]["urgent"], 0);

    let schedules = json_of(dir.path(), &["schedules"]);
    assert_eq!(schedules, Value::Array(Vec::new()));

    let output = tally_cmd(dir.path()).args(["snapshot"]).output().unwrap();
    assert!(output.status.success());
    let snapshot: Value = serde_json::from_slice(&output.stdout).unwrap();
    for key in [
        "contributions",
        "staffStats",
        "quotas",
        "quotaHistory",
        "priorities",
        "categories",
    ] {
        assert!(snapshot.get(key).is_some(), "snapshot missing {key}");
    }
}

#[test]
fn reset_zeroes_monthly_counts() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    std::fs::write(
        dir.path().join(".tally/data.json"),
        r#"{"staffStats": {"100": {"totalTickets": 4, "monthlyTickets": 3, "activeTickets": []}}}"#,
    )
    .unwrap();

    let reset = json_of(dir.path(), &["quota", "reset"]);
    assert_eq!(reset["reset"], 1);

    let stats = json_of(dir.path(), &["stats"]);
    let alice = &stats["leaderboard"][0];
    assert_eq!(alice["staffId"], "100");
    assert_eq!(alice["totalTickets"], 4);
    assert_eq!(alice["monthlyTickets"], 0);
}

//! Integration tests for `dh config` commands.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn config_get_with_nothing_set() {
    let env = TestEnv::new();
    let output = env.dh().args(["config", "get"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(json.get("api_key").is_none());
    assert!(json.get("github_token").is_none());
}

#[test]
fn config_set_and_get_redacted() {
    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "api-key", "key_1234567890"])
        .assert()
        .success();

    let output = env.dh().args(["config", "get"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["api_key"], "****7890");
    // The raw secret never appears in output
    assert!(!stdout.contains("key_1234567890"));
}

#[test]
fn config_clear_removes_credential() {
    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "github-token", "ghp_secret1234"])
        .assert()
        .success();
    env.dh()
        .args(["config", "clear", "github-token"])
        .assert()
        .success();

    let output = env.dh().args(["config", "get"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(json.get("github_token").is_none());
}

#[test]
fn config_set_unknown_key_fails() {
    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "password", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown config key"));
}

#[test]
fn config_set_empty_value_fails() {
    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "api-key", ""])
        .assert()
        .failure();
}

#[test]
fn config_get_human_format() {
    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "api-key", "key_1234567890"])
        .assert()
        .success();
    env.dh()
        .args(["-H", "config", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("api-key:      ****7890"))
        .stdout(predicate::str::contains("github-token: (not set)"));
}

#[cfg(unix)]
#[test]
fn secrets_are_stored_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    env.dh()
        .args(["config", "set", "api-key", "key_secret"])
        .assert()
        .success();

    let mode = std::fs::metadata(env.data_path().join("api-key.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn commands_needing_api_key_fail_without_one() {
    let env = TestEnv::new();
    env.dh()
        .args(["agent", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dh config set api-key"));
}

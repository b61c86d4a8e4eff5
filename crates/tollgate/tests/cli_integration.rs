//! CLI integration tests for the Tollgate command-line interface.
//!
//! These tests do not require a running API - they cover argument parsing,
//! endpoint classification and the stored session.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the tollgate binary with an isolated session file.
fn tollgate(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tollgate").unwrap();
    cmd.env_remove("TOLLGATE_CONFIG")
        .env_remove("TOLLGATE_BASE_URL")
        .arg("--session-file")
        .arg(temp.path().join("session.json"));
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("tollgate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("request"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("tollgate")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tollgate"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Classify Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_classify_numeric_brand_is_public() {
    let temp = TempDir::new().unwrap();
    tollgate(&temp)
        .args(["classify", "get", "/api/brands/42"])
        .assert()
        .success()
        .stdout(predicate::str::diff("public\n"));
}

#[test]
fn test_classify_profile_is_protected() {
    let temp = TempDir::new().unwrap();
    tollgate(&temp)
        .args(["classify", "GET", "/api/profile"])
        .assert()
        .success()
        .stdout(predicate::str::diff("protected\n"));
}

#[test]
fn test_classify_uses_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("tollgate.toml");
    std::fs::write(&config, "extra_public_paths = [\"status/health\"]\n").unwrap();

    tollgate(&temp)
        .arg("--config")
        .arg(&config)
        .args(["classify", "GET", "/api/status/health"])
        .assert()
        .success()
        .stdout(predicate::str::diff("public\n"));
}

#[test]
fn test_classify_rejects_bad_method() {
    let temp = TempDir::new().unwrap();
    tollgate(&temp)
        .args(["classify", "G ET", "/api/profile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid HTTP method"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_session_login_show_clear() {
    let temp = TempDir::new().unwrap();

    tollgate(&temp)
        .args(["session", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": false"));

    tollgate(&temp)
        .args([
            "session",
            "login",
            "--access-token",
            "secret-access",
            "--refresh-token",
            "secret-refresh",
            "--brand",
            "77",
        ])
        .assert()
        .success();

    tollgate(&temp)
        .args(["session", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": true"))
        .stdout(predicate::str::contains("\"brand_context_id\": \"77\""))
        .stdout(predicate::str::contains("secret").not());

    tollgate(&temp).args(["session", "clear"]).assert().success();
    tollgate(&temp).args(["session", "clear"]).assert().success();

    tollgate(&temp)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Authenticated: no"));
}

#[test]
fn test_request_rejects_invalid_json() {
    let temp = TempDir::new().unwrap();
    tollgate(&temp)
        .args(["request", "POST", "/api/profile", "--data", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data must be valid JSON"));
}

//! CLI integration tests for the Parley command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Configuration is loaded, validated and printed with secrets masked
//! - Tokens can be minted for local testing
//!
//! Note: These tests do not start a server or touch a backing store.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the parley binary, isolated from the caller's environment.
fn parley() -> Command {
    let mut cmd = Command::cargo_bin("parley").unwrap();
    cmd.env_remove("PARLEY_JWT_SECRET")
        .env_remove("PARLEY_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// Write `contents` to a config file in a fresh temp dir.
fn config_file(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("parley.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

const VALID_CONFIG: &str = r#"
[auth]
jwt_secret = "cli-test-secret"

[[users]]
id = "u1"
name = "Ada"
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    parley()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Parley"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("token"));
}

#[test]
fn test_version_displays() {
    parley()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("parley"));
}

#[test]
fn test_serve_help() {
    parley()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--store-url"));
}

#[test]
fn test_unknown_subcommand_fails() {
    parley().arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// check-config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_config_accepts_valid_file() {
    let (_dir, path) = config_file(VALID_CONFIG);

    parley()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded config"))
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn test_check_config_show_masks_secret() {
    let (_dir, path) = config_file(VALID_CONFIG);

    parley()
        .arg("--config")
        .arg(&path)
        .args(["check-config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("cli-test-secret").not());
}

#[test]
fn test_check_config_rejects_missing_secret() {
    let (_dir, path) = config_file("[server]\nport = 9000\n");

    parley()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration is invalid"));
}

#[test]
fn test_env_secret_satisfies_validation() {
    let (_dir, path) = config_file("[server]\nport = 9000\n");

    parley()
        .env("PARLEY_JWT_SECRET", "from-env")
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("PARLEY_JWT_SECRET"));
}

#[test]
fn test_malformed_explicit_config_fails() {
    let (_dir, path) = config_file("[server\nport = ");

    parley()
        .arg("--config")
        .arg(&path)
        .arg("check-config")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// token
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_token_prints_jwt() {
    let (_dir, path) = config_file(VALID_CONFIG);

    parley()
        .arg("--config")
        .arg(&path)
        .args(["token", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[\w-]+\.[\w-]+\.[\w-]+\n$").unwrap());
}

#[test]
fn test_token_requires_secret() {
    let (_dir, path) = config_file("");

    parley()
        .arg("--config")
        .arg(&path)
        .args(["token", "u1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no JWT secret configured"));
}

#[test]
fn test_token_rejects_non_positive_ttl() {
    let (_dir, path) = config_file(VALID_CONFIG);

    parley()
        .arg("--config")
        .arg(&path)
        .args(["token", "u1", "--ttl", "0"])
        .assert()
        .failure();
}

//! Integration tests for the `vaillant` CLI binary.
//!
//! Argument parsing, completions and error exits run offline. The account
//! flows run against a wiremock server with the profile supplied through
//! the environment and every config/data directory inside a tempdir.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vaillant_api::Token;

// ── Helpers ─────────────────────────────────────────────────────────

/// `vaillant` with env isolation rooted at `home`.
fn vaillant_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("vaillant");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("RUST_LOG")
        .env_remove("VAILLANT_PROFILE")
        .env_remove("VAILLANT_OUTPUT")
        .env_remove("VAILLANT_PASSWORD");
    cmd
}

/// Same, plus a `default` profile pointing both API hosts at `uri`.
fn profile_cmd(home: &Path, uri: &str) -> assert_cmd::Command {
    let mut cmd = vaillant_cmd(home);
    cmd.env("VAILLANT_PROFILES__DEFAULT__USERNAME", "tester@example.com")
        .env("VAILLANT_PROFILES__DEFAULT__APPLICATION_ID", "app-id-test")
        .env("VAILLANT_PROFILES__DEFAULT__APP_URL", uri)
        .env("VAILLANT_PROFILES__DEFAULT__API_URL", uri)
        .env("VAILLANT_PASSWORD", "secret");
    cmd
}

fn token_file(home: &Path) -> std::path::PathBuf {
    home.join("data").join("vaillant").join("tokens").join("default.token")
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run off the runtime thread so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command, args: &[&str]) -> std::process::Output {
    cmd.args(args);
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn login_ok(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": "200",
        "data": { "token": token, "uid": "uid-1" }
    }))
}

fn bindings() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "devices": [{
            "did": "did-1",
            "mac": "abcd123456",
            "product_key": "pk",
            "product_name": "Vaillant boiler",
            "host": "m2m.example.com",
            "ws_port": 8080,
            "wss_port": 8880,
            "is_online": true,
            "dev_alias": "Kitchen"
        }]
    }))
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = vaillant_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("send"))
            .and(predicate::str::contains("login")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vaillant"));
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_output_format() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path())
        .args(["--output", "yaml", "devices"])
        .assert()
        .code(2);
}

#[test]
fn test_send_requires_attributes() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path()).arg("send").assert().code(2);
}

#[test]
fn test_devices_without_profile_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path())
        .arg("devices")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'default' not found"));
}

#[test]
fn test_logout_without_cached_token() {
    let home = tempfile::tempdir().unwrap();
    vaillant_cmd(home.path())
        .arg("logout")
        .assert()
        .success()
        .stderr(predicate::str::contains("No cached token"));
}

// ── Account flows ───────────────────────────────────────────────────

#[tokio::test]
async fn test_login_caches_token_and_logout_clears_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/user/login"))
        .respond_with(login_ok("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let output = run(profile_cmd(home.path(), &server.uri()), &["login"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("Logged in as tester@example.com"));

    let blob = std::fs::read_to_string(token_file(home.path())).unwrap();
    let token = Token::deserialize(&blob).unwrap();
    assert_eq!(token.username, "tester@example.com");
    assert_eq!(token.uid, "uid-1");

    let output = run(vaillant_cmd(home.path()), &["logout"]).await;
    assert!(output.status.success());
    assert!(!token_file(home.path()).exists());
}

#[tokio::test]
async fn test_rejected_login_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "500" })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let output = run(profile_cmd(home.path(), &server.uri()), &["login"]).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
    assert!(!token_file(home.path()).exists());
}

#[tokio::test]
async fn test_devices_json_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/user/login"))
        .respond_with(login_ok("fresh"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/bindings"))
        .and(header("X-Gizwits-User-token", "fresh"))
        .respond_with(bindings())
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let output = run(
        profile_cmd(home.path(), &server.uri()),
        &["--output", "json", "devices"],
    )
    .await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let devices: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(devices[0]["did"], "did-1");
    assert_eq!(devices[0]["mac"], "abcd123456");
}

#[tokio::test]
async fn test_expired_cached_token_triggers_one_relogin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/bindings"))
        .and(header("X-Gizwits-User-token", "stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error_code": 9004 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/app/user/login"))
        .respond_with(login_ok("fresh"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app/bindings"))
        .and(header("X-Gizwits-User-token", "fresh"))
        .respond_with(bindings())
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let stale = Token::new("app-id-test", "tester@example.com", "secret", "stale", "uid-1");
    let path = token_file(home.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, stale.serialize()).unwrap();

    let output = run(profile_cmd(home.path(), &server.uri()), &["devices"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Kitchen"));

    let refreshed = Token::deserialize(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(refreshed.access_token.expose_secret(), "fresh");
}

//! Integration tests for the `entcache` CLI binary.
//!
//! Argument parsing, config handling, and a few end-to-end runs against
//! a wiremock API. No test touches the user's real configuration.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `entcache` binary with env isolation.
///
/// Clears all `ENTCACHE_*` env vars and points the config file at
/// `config` so tests never read the user's real configuration.
fn entcache_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("entcache");
    cmd.env("ENTCACHE_CONFIG", config)
        .env_remove("ENTCACHE_PROFILE")
        .env_remove("ENTCACHE_BASE_URL")
        .env_remove("ENTCACHE_TOKEN")
        .env_remove("ENTCACHE_OUTPUT")
        .env_remove("ENTCACHE_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Run a command off the async runtime and parse stdout as JSON.
async fn run_json(mut cmd: assert_cmd::Command) -> (Option<i32>, Value) {
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = serde_json::from_str(&stdout).unwrap_or(Value::Null);
    (output.status.code(), value)
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = entcache_cmd(&dir.path().join("config.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "Expected 'Usage' in:\n{stderr}");
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    entcache_cmd(&dir.path().join("config.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("react"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    entcache_cmd(&dir.path().join("config.toml"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_env() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    entcache_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_set_profile_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    entcache_cmd(&config)
        .args(["config", "set-profile", "local", "--url", "http://localhost:3000/api"])
        .assert()
        .success();

    let text = std::fs::read_to_string(&config).unwrap();
    assert!(text.contains("http://localhost:3000/api"));
    assert!(text.contains("default_profile = \"local\""));

    entcache_cmd(&config)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local (default)"));
}

#[test]
fn test_show_redacts_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "[profiles.prod]\nbase_url = \"https://api.example.com\"\ntoken = \"s3cret\"\n",
    )
    .unwrap();

    entcache_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("api.example.com")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("s3cret").not()),
        );
}

#[test]
fn test_missing_base_url_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    entcache_cmd(&dir.path().join("config.toml"))
        .args(["list", "product"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No API base URL configured"));
}

#[test]
fn test_unknown_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    entcache_cmd(&dir.path().join("config.toml"))
        .args(["--profile", "nope", "list", "product"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_bad_filter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    entcache_cmd(&dir.path().join("config.toml"))
        .args(["--base-url", "http://127.0.0.1:9/api", "list", "product", "--filter", "oops"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("expected key=value"));
}

// ── Against a mock API ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_list_prints_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/product"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "5"))
        .and(query_param("category", "desk"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "list": [{ "id": 1, "category": "desk", "createdAt": "2024-01-01T00:00:00Z" }],
                "pagination": { "totalCount": 1, "totalPages": 1, "currentPage": 1 },
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base_url = format!("{}/api", server.uri());
    let mut cmd = entcache_cmd(&dir.path().join("config.toml"));
    cmd.args([
        "--base-url",
        base_url.as_str(),
        "--token",
        "tok-1",
        "-o",
        "json-compact",
        "list",
        "product",
        "--limit",
        "5",
        "--filter",
        "category=desk",
    ]);

    let (code, body) = run_json(cmd).await;
    assert_eq!(code, Some(0));
    assert_eq!(body["entity"], "product");
    assert_eq!(body["totalCount"], 1);
    assert_eq!(body["Data"][0]["createdAt"], "2024-01-01T00:00:00Z");
    assert_eq!(body["Data"][0]["reactions"], json!({ "views": 0, "likes": 0 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_missing_record_exits_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/post/p404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "no such post" })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base_url = format!("{}/api", server.uri());
    let mut cmd = entcache_cmd(&dir.path().join("config.toml"));
    cmd.args(["--base-url", base_url.as_str(), "get", "post", "p404"]);

    let (code, _) = run_json(cmd).await;
    assert_eq!(code, Some(4));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_react_reports_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "p1", "reactions": { "views": 5, "likes": 2 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "msg": "reaction recorded",
            "data": { "id": "p1", "reactions": { "views": 6, "likes": 3 } },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base_url = format!("{}/api", server.uri());
    let mut cmd = entcache_cmd(&dir.path().join("config.toml"));
    cmd.args([
        "--base-url",
        base_url.as_str(),
        "react",
        "post",
        "p1",
        "--user",
        "u1",
        "--views",
        "6",
        "--likes",
        "3",
    ]);

    let (code, body) = run_json(cmd).await;
    assert_eq!(code, Some(0));
    assert_eq!(body["Message"], "reaction recorded");
    assert_eq!(body["Data"]["reactions"]["likes"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_all_stops_at_total_pages() {
    let server = MockServer::start().await;
    // Always claims to be page 1 of 3.
    Mock::given(method("GET"))
        .and(path("/api/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "list": [{ "id": 1, "createdAt": "2024-01-01T00:00:00Z" }],
                "pagination": { "totalCount": 3, "totalPages": 3, "currentPage": 1 },
            }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let base_url = format!("{}/api", server.uri());
    let mut cmd = entcache_cmd(&dir.path().join("config.toml"));
    cmd.args([
        "--base-url",
        base_url.as_str(),
        "-o",
        "json-compact",
        "list",
        "product",
        "--all",
    ]);

    let (code, body) = run_json(cmd).await;
    assert_eq!(code, Some(0));
    assert_eq!(body["Data"].as_array().unwrap().len(), 3);
    assert_eq!(body["currentPage"], 3);
}

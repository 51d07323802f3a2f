use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const MIXED: &str = "tests/fixtures/mixed.har";

fn harcurl() -> Command {
    let mut cmd = cargo_bin_cmd!();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help() {
    harcurl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("turn it into curl"));
}

#[test]
fn test_version() {
    harcurl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harcurl"));
}

#[test]
fn test_filter_stats() {
    harcurl()
        .args(["filter", MIXED])
        .assert()
        .success()
        .stdout(predicate::str::contains("total=10"))
        .stdout(predicate::str::contains("kept=4"))
        .stdout(predicate::str::contains("removed=6"))
        .stdout(predicate::str::contains("html=1"))
        .stdout(predicate::str::contains("static_asset_mime=1"))
        .stdout(predicate::str::contains("static_asset_url=1"))
        .stdout(predicate::str::contains("tracking=1"))
        .stdout(predicate::str::contains("data_blob=0"))
        .stdout(predicate::str::contains("redirects=1"))
        .stdout(predicate::str::contains("options=1"));
}

#[test]
fn test_filter_json() {
    let output = harcurl()
        .args(["filter", MIXED, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["stats"]["total"], 10);
    assert_eq!(value["breakdown"]["staticAssetUrl"], 1);
    let indices: Vec<u64> = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![2, 3, 5, 9]);
}

#[test]
fn test_summarize_collapses_repeated_endpoints() {
    harcurl()
        .args(["summarize", MIXED])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[2] GET https://shop.example.com/api/products?limit={limit}&page={page}",
        ))
        .stdout(predicate::str::contains("[x2]"))
        .stdout(predicate::str::contains("[5] POST https://shop.example.com/api/cart → 201"))
        .stdout(predicate::str::contains("page=1").not())
        .stdout(predicate::str::contains("[3]").not())
        .stderr(predicate::str::contains("3 lines for 4 entries"));
}

#[test]
fn test_summarize_without_dedup() {
    harcurl()
        .args(["summarize", MIXED, "--no-dedup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[3] GET https://shop.example.com/api/products?page=2&limit=20"))
        .stdout(predicate::str::contains("[x2]").not())
        .stderr(predicate::str::contains("4 lines for 4 entries"));
}

#[test]
fn test_curl_redacts_by_default() {
    harcurl()
        .args(["curl", MIXED, "--index", "5"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("curl \\\n  'https://shop.example.com/api/cart'"))
        .stdout(predicate::str::contains("-H 'Authorization: [REDACTED]'"))
        .stdout(predicate::str::contains("it'\\''s a gift"))
        .stdout(predicate::str::contains("-X POST").not())
        .stdout(predicate::str::contains(":authority").not())
        .stdout(predicate::str::contains("Content-Length").not())
        .stdout(predicate::str::contains("Accept-Encoding").not())
        .stdout(predicate::str::contains("tok-123").not());
}

#[test]
fn test_curl_no_redact() {
    harcurl()
        .args(["curl", MIXED, "--index", "5", "--no-redact"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-H 'Authorization: Bearer tok-123'"));
}

#[test]
fn test_curl_form_params() {
    harcurl()
        .args(["curl", MIXED, "--index", "9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--data-urlencode 'user=ann'"))
        .stdout(predicate::str::contains("--data-urlencode 'remember=1'"))
        .stdout(predicate::str::contains("-H 'Cookie: [REDACTED]'"));
}

#[test]
fn test_curl_index_out_of_range() {
    harcurl()
        .args(["curl", MIXED, "--index", "99"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_malformed_capture() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.har");
    std::fs::write(&path, "{\"log\": {\"entries\": [").unwrap();

    harcurl()
        .arg("filter")
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: Malformed capture"));
}

#[test]
fn test_capture_without_entries() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.har");
    std::fs::write(&path, "{\"log\": {\"version\": \"1.2\"}}").unwrap();

    harcurl()
        .arg("summarize")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid HAR file"));
}

#[test]
fn test_missing_file() {
    harcurl()
        .args(["filter", "tests/fixtures/does-not-exist.har"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_config_prints_resolved_values() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("harcurl.toml");
    std::fs::write(&path, "[server]\nport = 4567\n\n[matcher]\nmodel = \"local-model\"\n").unwrap();

    harcurl()
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join("xdg"))
        .arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("port = 4567"))
        .stdout(predicate::str::contains("model = \"local-model\""))
        .stdout(predicate::str::contains("ttl_secs = 1800"));
}

#[test]
fn test_invalid_config_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.toml");
    std::fs::write(&path, "[server\n").unwrap();

    harcurl()
        .env("HOME", tmp.path())
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[cfg(feature = "completions")]
#[test]
fn test_completions() {
    harcurl()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("harcurl"));
}

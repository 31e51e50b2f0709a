//! CLI tests for ak-core: audit reports, exit codes and error output.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Get a Command for the ak-core binary, isolated from user config.
fn ak_core(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ak-core").expect("ak-core binary should exist");
    cmd.env_remove("AK_CONFIG")
        .env_remove("AK_MAX_WORKERS")
        .env_remove("AK_DETECTION_TIMEOUT_MS")
        .env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .env("AK_LOG", "off");
    cmd
}

struct Fixture {
    dir: TempDir,
    schema: PathBuf,
    rows: PathBuf,
}

fn fixture(rows: &[Value]) -> Fixture {
    let dir = tempdir().expect("tempdir");
    let schema = dir.path().join("schema.json");
    fs::write(
        &schema,
        json!({
            "name": "ledger",
            "fields": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "vendor", "type": "string", "indexed": true},
                {"name": "amount", "type": "currency"}
            ]
        })
        .to_string(),
    )
    .expect("write schema");
    let rows_path = dir.path().join("rows.jsonl");
    let body: Vec<String> = rows.iter().map(Value::to_string).collect();
    fs::write(&rows_path, body.join("\n")).expect("write rows");
    Fixture {
        dir,
        schema,
        rows: rows_path,
    }
}

fn clean_rows() -> Vec<Value> {
    (1..=20)
        .map(|i| json!({"id": i, "vendor": format!("v{}", i % 4), "amount": format!("{}.00", i * 10)}))
        .collect()
}

fn audit(f: &Fixture) -> Command {
    let mut cmd = ak_core(f.dir.path());
    cmd.arg("audit")
        .arg("--schema")
        .arg(&f.schema)
        .arg("--rows")
        .arg(&f.rows);
    cmd
}

// ============================================================================
// audit
// ============================================================================

#[test]
fn clean_audit_exits_zero() {
    let f = fixture(&clean_rows());
    let out = audit(&f)
        .args(["--detect", r#"DUPLICATES:{"fields": ["vendor", "amount"]}"#])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json report");
    assert_eq!(report["ingest"]["accepted"], 20);
    assert_eq!(report["detections"][0]["status"], "ok");
    assert_eq!(report["findings"], json!([]));
    assert_eq!(report["hex_map"]["regions"], json!([]));
    assert_eq!(report["table"]["row_count"], 20);
    assert!(report["config"]["effective_hash"].is_string());
}

#[test]
fn duplicate_pair_exits_one_with_hex_map() {
    let mut rows = clean_rows();
    rows.push(json!({"id": 99, "vendor": "v9", "amount": "77.77"}));
    rows.push(json!({"id": 100, "vendor": "v9", "amount": "77.77"}));
    let f = fixture(&rows);
    let out = audit(&f)
        .args(["--detect", r#"DUPLICATES:{"fields": ["vendor", "amount"]}"#])
        .args(["--radius", "10"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).unwrap();
    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["metric_value"], 2.0);
    assert_eq!(findings[0]["affected_row_ids"], json!([20, 21]));
    assert_eq!(report["hex_map"]["regions"][0]["anomaly_count"], 1);
    assert_eq!(report["hex_map"]["radius"], 10.0);
    // A single fresh Warning averages 2.0: yellow, not red.
    assert_eq!(report["hex_map"]["regions"][0]["risk_level"], "YELLOW");
    assert_eq!(report["risk"], json!({"red_regions": 0, "yellow_regions": 1}));
}

#[test]
fn requests_file_and_summary_format() {
    let f = fixture(&clean_rows());
    let requests = f.dir.path().join("requests.json");
    fs::write(
        &requests,
        json!([
            {"function": "BENFORD", "params": {"field": "amount"}},
            {"function": "GAPS", "params": {"field": "id"}}
        ])
        .to_string(),
    )
    .unwrap();
    audit(&f)
        .arg("--requests")
        .arg(&requests)
        .args(["--format", "summary"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("20 accepted, 0 rejected"));
}

#[test]
fn jsonl_emits_one_object_per_line() {
    let f = fixture(&clean_rows());
    let out = audit(&f)
        .args(["--detect", r#"BENFORD:{"field": "amount"}"#, "-f", "jsonl"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    let types: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types[0], "table");
    assert_eq!(types.last().map(String::as_str), Some("finding"));
}

#[test]
fn unknown_function_is_an_args_error() {
    let f = fixture(&clean_rows());
    let out = audit(&f)
        .args(["--detect", "NOPE"])
        .assert()
        .code(10)
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["detections"][0]["status"], "error");
    assert_eq!(report["detections"][0]["error"]["code"], 30);
}

#[test]
fn invalid_params_are_an_args_error() {
    let f = fixture(&clean_rows());
    audit(&f)
        .args(["--detect", r#"OUTLIERS:{"field": "vendor"}"#])
        .assert()
        .code(10);
}

#[test]
fn rejected_rows_are_reported_not_fatal() {
    let mut rows = clean_rows();
    rows.push(json!({"id": 1, "vendor": "dup", "amount": "1.00"}));
    rows.push(json!({"id": 50, "vendor": "x", "amount": "abc"}));
    let f = fixture(&rows);
    let out = audit(&f).assert().code(0).get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["ingest"]["accepted"], 20);
    assert_eq!(report["ingest"]["rejected"].as_array().unwrap().len(), 2);
    assert_eq!(report["ingest"]["rejected"][0]["row_index"], 20);
}

#[test]
fn malformed_schema_exits_twelve() {
    let f = fixture(&clean_rows());
    fs::write(
        &f.schema,
        json!({"name": "t", "fields": [{"name": "x", "type": "integer"}]}).to_string(),
    )
    .unwrap();
    audit(&f)
        .assert()
        .code(12)
        .stderr(predicate::str::contains("\"category\": \"schema\""));
}

#[test]
fn missing_rows_file_is_an_io_error() {
    let f = fixture(&clean_rows());
    fs::remove_file(&f.rows).unwrap();
    audit(&f).assert().code(21);
}

// ============================================================================
// config
// ============================================================================

#[test]
fn invalid_config_exits_eleven() {
    let f = fixture(&clean_rows());
    let config = f.dir.path().join("kernel.toml");
    fs::write(&config, "max_workers = 0\n").unwrap();
    audit(&f)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(11)
        .stderr(predicate::str::contains("max_workers"));
}

#[test]
fn check_config_reports_defaults() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"valid\""));
}

#[test]
fn check_config_missing_file_fails() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .args(["check-config", "/nonexistent/kernel.toml"])
        .assert()
        .code(11);
}

// ============================================================================
// catalog / schema / synth / version
// ============================================================================

#[test]
fn catalog_lists_builtins() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .args(["catalog", "-f", "summary"])
        .assert()
        .success()
        .stdout(predicate::str::diff("BENFORD DUPLICATES GAPS OUTLIERS\n"));
}

#[test]
fn schema_command_prints_json_schema() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("primary_key"));
}

#[test]
fn synth_output_round_trips_through_audit() {
    let dir = tempdir().unwrap();
    let out = ak_core(dir.path())
        .args(["synth", "--rows", "500", "--seed", "3", "--duplicates", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 500);

    let f = fixture(&[]);
    fs::write(&f.rows, &text).unwrap();
    let out = audit(&f)
        .args(["--detect", r#"DUPLICATES:{"fields": ["vendor", "amount"]}"#])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["findings"].as_array().unwrap().len(), 2);
}

#[test]
fn version_is_json() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ak_core_version"));
}

#[test]
fn unknown_command_fails() {
    let dir = tempdir().unwrap();
    ak_core(dir.path())
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

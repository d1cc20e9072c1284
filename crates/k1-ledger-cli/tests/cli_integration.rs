use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_k1<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_k1"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to run k1 binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_k1(args);
    assert!(
        output.status.success(),
        "command failed\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!("stdout was not JSON: {err}\n{}", String::from_utf8_lossy(&output.stdout))
    })
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("non-UTF8 path {}", path.display()))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field {key}: {value}"))
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer field {key}: {value}"))
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents)
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
    path
}

fn write_bundle(dir: &Path, name: &str, bundle: &Value) -> PathBuf {
    let body = serde_json::to_vec_pretty(bundle)
        .unwrap_or_else(|err| panic!("failed to serialize bundle: {err}"));
    write_file(dir, name, &body)
}

fn standard_bundle(run_id: &str, period: &str, ssn: &str, share: f64, income: f64) -> Value {
    serde_json::json!({
        "source_run_id": run_id,
        "period": period,
        "placeholder_mapping": {
            "<EIN_1>": "12-3456789",
            "<US_SSN_2>": ssn,
            "<PERSON_3>": "Jordan Example",
        },
        "issuer_name": "Alpha Ventures LP",
        "recipient_role": "Limited partner",
        "share_percentage": share,
        "ordinary_business_income": income,
        "precheck": { "passed": true, "critical_count": 0, "warning_count": 0 },
        "ai_review": { "coherence_score": 0.95, "ocr_confidence": 0.9 },
    })
}

fn ingest(snapshot: &Path, bundle: &Path, document: &Path) -> Value {
    run_json([
        "--snapshot",
        path_str(snapshot),
        "ingest",
        "--bundle",
        path_str(bundle),
        "--document",
        path_str(document),
    ])
}

#[test]
fn ingest_and_validate_clean_scope() {
    let sandbox = unique_temp_dir("k1-cli-clean");
    let snapshot = sandbox.join("ledger.ndjson");

    let bundle_a =
        write_bundle(&sandbox, "a.json", &standard_bundle("run_a", "2023", "111-11-1111", 60.0, 60_000.0));
    let bundle_b =
        write_bundle(&sandbox, "b.json", &standard_bundle("run_b", "2023", "222-22-2222", 40.0, 40_000.0));
    let doc_a = write_file(&sandbox, "a.pdf", b"document A bytes");
    let doc_b = write_file(&sandbox, "b.pdf", b"document B bytes");

    let stored_a = ingest(&snapshot, &bundle_a, &doc_a);
    assert_eq!(as_str(&stored_a, "status"), "stored");
    assert_eq!(as_str(&stored_a, "issuer_id"), "12-3456789");
    assert_eq!(as_u64(&stored_a, "record_count"), 1);

    let stored_b = ingest(&snapshot, &bundle_b, &doc_b);
    assert_eq!(as_u64(&stored_b, "record_count"), 2);

    let report = run_json(["--snapshot", path_str(&snapshot), "validate"]);
    assert_eq!(as_str(&report, "contract_version"), "k1.v1");
    let summary = &report["summary"];
    assert_eq!(as_u64(summary, "failed"), 0, "clean scope should pass: {report}");
    assert!(as_u64(summary, "total_checks") > 0);
    let scopes = report["scopes_validated"]
        .as_array()
        .unwrap_or_else(|| panic!("missing scopes_validated: {report}"));
    assert_eq!(scopes.len(), 1);
    assert_eq!(as_u64(&scopes[0], "recipient_count"), 2);
}

#[test]
fn duplicate_document_is_not_restored() {
    let sandbox = unique_temp_dir("k1-cli-dup");
    let snapshot = sandbox.join("ledger.ndjson");

    let bundle =
        write_bundle(&sandbox, "a.json", &standard_bundle("run_a", "2023", "111-11-1111", 50.0, 10_000.0));
    let doc = write_file(&sandbox, "a.pdf", b"same bytes");

    ingest(&snapshot, &bundle, &doc);
    let second = ingest(&snapshot, &bundle, &doc);
    assert_eq!(as_str(&second, "status"), "duplicate");
    assert_eq!(as_u64(&second, "record_count"), 1);
    assert_eq!(as_str(&second["duplicate_of"], "source_run_id"), "run_a");
}

#[test]
fn unresolvable_identifiers_skip_ingestion() {
    let sandbox = unique_temp_dir("k1-cli-skip");
    let snapshot = sandbox.join("ledger.ndjson");

    let mut bundle = standard_bundle("run_a", "2023", "111-11-1111", 50.0, 10_000.0);
    bundle["placeholder_mapping"] = serde_json::json!({ "<PERSON_1>": "Jordan Example" });
    let bundle_path = write_bundle(&sandbox, "a.json", &bundle);
    let doc = write_file(&sandbox, "a.pdf", b"bytes");

    let outcome = ingest(&snapshot, &bundle_path, &doc);
    assert_eq!(as_str(&outcome, "status"), "skipped");
    assert_eq!(as_str(&outcome, "reason"), "unresolvable_identifiers");

    let count = run_json(["--snapshot", path_str(&snapshot), "records", "count"]);
    assert_eq!(as_u64(&count, "record_count"), 0);
}

#[test]
fn amended_document_is_flagged_by_validation() {
    let sandbox = unique_temp_dir("k1-cli-amend");
    let snapshot = sandbox.join("ledger.ndjson");

    let original =
        write_bundle(&sandbox, "a.json", &standard_bundle("run_a", "2023", "111-11-1111", 50.0, 10_000.0));
    let amended =
        write_bundle(&sandbox, "b.json", &standard_bundle("run_b", "2023", "111-11-1111", 50.0, 12_000.0));
    let doc_a = write_file(&sandbox, "a.pdf", b"original filing");
    let doc_b = write_file(&sandbox, "b.pdf", b"amended filing");

    ingest(&snapshot, &original, &doc_a);
    let second = ingest(&snapshot, &amended, &doc_b);
    assert_eq!(as_str(&second, "status"), "stored");
    assert_eq!(as_u64(&second, "record_count"), 1, "same key must replace");

    let report = run_json([
        "--snapshot",
        path_str(&snapshot),
        "validate",
        "--issuer",
        "12-3456789",
        "--period",
        "2023",
        "--triggered-by",
        "run_b",
    ]);
    let results = report["results"]
        .as_array()
        .unwrap_or_else(|| panic!("missing results: {report}"));
    let amendment = results
        .iter()
        .find(|r| as_str(r, "rule_id") == "C2_AMENDED_RECORD" && r["passed"] == Value::Bool(false))
        .unwrap_or_else(|| panic!("expected amended-record failure: {report}"));
    assert!(as_str(amendment, "message").contains("ordinary_business_income"));
    assert_eq!(as_str(amendment, "triggering_run_id"), "run_b");
}

#[test]
fn consecutive_periods_run_continuity_checks() {
    let sandbox = unique_temp_dir("k1-cli-pairs");
    let snapshot = sandbox.join("ledger.ndjson");

    let mut year_one = standard_bundle("run_2023", "2023", "111-11-1111", 50.0, 10_000.0);
    year_one["capital_account_ending"] = serde_json::json!(80_000.0);
    let mut year_two = standard_bundle("run_2024", "2024", "111-11-1111", 50.0, 11_000.0);
    year_two["capital_account_beginning"] = serde_json::json!(80_000.0);

    let bundle_one = write_bundle(&sandbox, "y1.json", &year_one);
    let bundle_two = write_bundle(&sandbox, "y2.json", &year_two);
    let doc_one = write_file(&sandbox, "y1.pdf", b"year one");
    let doc_two = write_file(&sandbox, "y2.pdf", b"year two");

    ingest(&snapshot, &bundle_one, &doc_one);
    ingest(&snapshot, &bundle_two, &doc_two);

    let report = run_json(["--snapshot", path_str(&snapshot), "validate"]);
    assert_eq!(as_u64(&report, "continuity_pairs_checked"), 1);
    let results = report["results"]
        .as_array()
        .unwrap_or_else(|| panic!("missing results: {report}"));
    let continuity = results
        .iter()
        .find(|r| as_str(r, "rule_id") == "B1_CAPITAL_CONTINUITY")
        .unwrap_or_else(|| panic!("expected capital continuity result: {report}"));
    assert_eq!(continuity["passed"], Value::Bool(true));
}

#[test]
fn validate_writes_report_file_when_asked() {
    let sandbox = unique_temp_dir("k1-cli-report");
    let snapshot = sandbox.join("ledger.ndjson");
    let report_path = sandbox.join("report.json");

    let bundle =
        write_bundle(&sandbox, "a.json", &standard_bundle("run_a", "2023", "111-11-1111", 50.0, 10_000.0));
    let doc = write_file(&sandbox, "a.pdf", b"bytes");
    ingest(&snapshot, &bundle, &doc);

    let stdout_report = run_json([
        "--snapshot",
        path_str(&snapshot),
        "validate",
        "--out",
        path_str(&report_path),
    ]);

    let body = fs::read_to_string(&report_path)
        .unwrap_or_else(|err| panic!("report file should exist: {err}"));
    let file_report: Value = serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("report file should be JSON: {err}"));
    assert_eq!(file_report["report_id"], stdout_report["report_id"]);
    assert_eq!(file_report["summary"], stdout_report["summary"]);
}

#[test]
fn records_purge_clears_the_snapshot() {
    let sandbox = unique_temp_dir("k1-cli-purge");
    let snapshot = sandbox.join("ledger.ndjson");

    let bundle_a =
        write_bundle(&sandbox, "a.json", &standard_bundle("run_a", "2023", "111-11-1111", 50.0, 10_000.0));
    let bundle_b =
        write_bundle(&sandbox, "b.json", &standard_bundle("run_b", "2024", "111-11-1111", 50.0, 11_000.0));
    let doc_a = write_file(&sandbox, "a.pdf", b"doc a");
    let doc_b = write_file(&sandbox, "b.pdf", b"doc b");
    ingest(&snapshot, &bundle_a, &doc_a);
    ingest(&snapshot, &bundle_b, &doc_b);

    let scoped = run_json([
        "--snapshot",
        path_str(&snapshot),
        "records",
        "purge",
        "--issuer",
        "12-3456789",
        "--period",
        "2023",
    ]);
    assert_eq!(as_u64(&scoped, "removed"), 1);
    assert_eq!(as_u64(&scoped, "record_count"), 1);

    let all = run_json(["--snapshot", path_str(&snapshot), "records", "purge"]);
    assert_eq!(as_u64(&all, "removed"), 1);
    assert_eq!(as_u64(&all, "record_count"), 0);
}

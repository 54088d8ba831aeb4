use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn autolog_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("autolog");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let logs_dir = root.join("logs");
    fs::create_dir_all(&logs_dir).unwrap();
    fs::write(
        logs_dir.join("api.jsonl"),
        r#"{"timestamp":"2026-10-01T10:00:00Z","level":"INFO","message":"service started","service":"api"}
{"timestamp":"2026-10-01T10:00:04Z","level":"WARN","message":"slow query on orders","service":"api"}
{"timestamp":"2026-10-01T10:00:05Z","level":"ERROR","message":"Database connection timeout","error_code":"DB_TIMEOUT","service":"api"}
{"timestamp":1790848806000,"level":"FATAL","message":"giving up after 3 retries","service":"api"}
"#,
    )
    .unwrap();
    fs::write(
        logs_dir.join("quiet.jsonl"),
        r#"{"timestamp":"2026-10-01T11:00:00Z","level":"INFO","message":"health check ok"}
{"timestamp":"2026-10-01T11:00:30Z","level":"DEBUG","message":"cache warm"}
"#,
    )
    .unwrap();
    fs::write(logs_dir.join("garbage.jsonl"), "not json at all\n").unwrap();

    // The disabled provider fails every client call, so no network is needed.
    let config_content = format!(
        r#"[db]
path = "{}/data/autolog.sqlite"

[jobs]
chunk_size = 25
call_timeout_secs = 5

[llm]
provider = "disabled"

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("autolog.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_autolog(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = autolog_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run autolog binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn log_path(config_path: &Path, name: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("logs").join(name).to_str().unwrap().to_string()
}

/// Ingest a file and return the id from the printed record.
fn ingest(config_path: &Path, name: &str) -> String {
    let path = log_path(config_path, name);
    let (stdout, stderr, success) = run_autolog(config_path, &["ingest", &path]);
    assert!(success, "ingest failed: {}", stderr);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    record["id"].as_str().unwrap().to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_autolog(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, s1) = run_autolog(&config, &["init"]);
    let (_, _, s2) = run_autolog(&config, &["init"]);
    assert!(s1);
    assert!(s2);
}

#[test]
fn test_ingest_counts_levels() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);

    let path = log_path(&config, "api.jsonl");
    let (stdout, stderr, success) =
        run_autolog(&config, &["ingest", &path, "--uploader", "oncall"]);
    assert!(success, "ingest failed: {}", stderr);

    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["filename"], "api.jsonl");
    assert_eq!(record["entry_count"], 4);
    assert_eq!(record["error_count"], 2);
    assert_eq!(record["warning_count"], 1);
    assert_eq!(record["processing_status"], "completed");
    assert_eq!(record["uploaded_by"], "oncall");

    let (stdout, _, success) = run_autolog(&config, &["files"]);
    assert!(success);
    assert!(stdout.contains("api.jsonl"));
}

#[test]
fn test_ingest_unparseable_file_fails() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);

    let path = log_path(&config, "garbage.jsonl");
    let (stdout, _, success) = run_autolog(&config, &["ingest", &path]);
    assert!(!success);
    assert!(stdout.contains("\"failed\""));
}

#[test]
fn test_files_empty() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (stdout, _, success) = run_autolog(&config, &["files"]);
    assert!(success);
    assert!(stdout.contains("No log files ingested."));
}

#[test]
fn test_analyze_without_errors_records_no_incident() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let id = ingest(&config, "quiet.jsonl");

    let (stdout, stderr, success) =
        run_autolog(&config, &["analyze", &id, "--progress", "off"]);
    assert!(success, "analyze failed: {}", stderr);

    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["totalChunks"], 0);
    assert_eq!(status["result"]["final"]["incidentType"], "No Incident");

    let job_id = status["id"].as_str().unwrap();
    let (stdout, _, success) = run_autolog(&config, &["status", job_id]);
    assert!(success);
    assert!(stdout.contains("No Incident"));

    let (stdout, _, success) = run_autolog(&config, &["jobs", &id]);
    assert!(success);
    let jobs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[test]
fn test_analyze_with_unavailable_service_fails_job() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let id = ingest(&config, "api.jsonl");

    let (stdout, stderr, success) =
        run_autolog(&config, &["analyze", &id, "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("failed"), "stderr: {}", stderr);

    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["status"], "failed");
    assert!(status["error"]
        .as_str()
        .unwrap()
        .starts_with("LLM service unavailable"));

    // The failed job no longer blocks a new request.
    let (stdout, _, _) = run_autolog(&config, &["analyze", &id, "--progress", "off"]);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["status"], "failed");
}

#[test]
fn test_analyze_unknown_file_fails() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (_, stderr, success) = run_autolog(&config, &["analyze", "nope", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_status_unknown_job_fails() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (_, stderr, success) = run_autolog(&config, &["status", "nope"]);
    assert!(!success);
    assert!(stderr.contains("job not found"), "stderr: {}", stderr);
}

#[test]
fn test_patterns_list_empty() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (stdout, _, success) = run_autolog(&config, &["patterns", "list"]);
    assert!(success);
    assert!(stdout.contains("No patterns learned yet."));

    let (_, _, success) = run_autolog(&config, &["patterns", "delete", "nope"]);
    assert!(!success);
}

#[test]
fn test_metrics() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (stdout, _, success) = run_autolog(&config, &["metrics"]);
    assert!(success);
    assert!(stdout.contains("Learning Metrics"));
    assert!(stdout.contains("Patterns:"));
}

#[test]
fn test_health_reports_disabled_provider() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (stdout, _, success) = run_autolog(&config, &["health"]);
    assert!(!success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["client"], "disabled");
    assert_eq!(report["ok"], false);
}

#[test]
fn test_feedback_on_unknown_memory_fails() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (_, stderr, success) = run_autolog(
        &config,
        &["feedback", "add", "nope", "incorrect", "--impact", "-0.2"],
    );
    assert!(!success);
    assert!(stderr.contains("memory not found"), "stderr: {}", stderr);

    let (stdout, _, success) = run_autolog(&config, &["feedback", "process"]);
    assert!(success);
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["processed"], 0);
}

#[test]
fn test_recover_with_nothing_active() {
    let (_tmp, config) = setup_test_env();
    run_autolog(&config, &["init"]);
    let (stdout, _, success) = run_autolog(&config, &["recover"]);
    assert!(success);
    assert!(stdout.contains("recovered 0 interrupted jobs"));
}

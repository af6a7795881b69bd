//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML stream definition → job creation,
//! polling and download → records

use clap::Parser;
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use solidafy_bulk::cli::{Cli, Runner};
use solidafy_bulk::{
    load_definition_from_str, Error, InMemoryMessageRepository, ReadOptions,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn definition(server: &MockServer, extra: &str) -> String {
    format!(
        r#"
name: accounts
http:
  base_url: {}
  max_retries: 0
  headers:
    Authorization: "Bearer {{{{ config.api_key }}}}"
slicer:
  type: list
  values: [Account, Contact]
  partition_field: object
creation:
  path: /jobs
  method: POST
  body:
    object: "{{{{ stream_slice.object }}}}"
polling:
  path: "/jobs/{{{{ creation_response.id }}}}"
download:
  path: "{{{{ download_target }}}}"
download_extractor:
  type: jsonl
delete:
  path: "/jobs/{{{{ creation_response.id }}}}"
  method: DELETE
download_target_path: results
status_path: state
status_mapping:
  running: [InProgress]
  completed: [JobComplete]
  failed: [Failed]
  timeout: [Expired]
{extra}"#,
        server.uri()
    )
}

fn fast() -> ReadOptions {
    ReadOptions::default().with_polling_interval(Duration::from_millis(10))
}

async fn mount_job(server: &MockServer, object: &str, job_id: &str, records: &str) {
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(body_json(json!({"object": object})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": job_id})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/jobs/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "JobComplete",
            "results": [format!("{}/results/{job_id}", server.uri())]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/results/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(records))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/jobs/{job_id}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

async fn read_all(yaml: &str, options: &ReadOptions) -> (Vec<Value>, Option<Error>) {
    let def = load_definition_from_str(yaml).unwrap();
    let retriever = def
        .build(
            &json!({"api_key": "secret"}),
            Arc::new(InMemoryMessageRepository::new()),
            options,
        )
        .unwrap();

    let mut records = Vec::new();
    let mut stream = retriever.read_records().unwrap();
    loop {
        match stream.try_next().await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => return (records, None),
            Err(e) => return (records, Some(e)),
        }
    }
}

// ============================================================================
// Bulk Export Tests
// ============================================================================

#[tokio::test]
async fn test_bulk_export_one_job_per_slice() {
    let server = MockServer::start().await;
    mount_job(&server, "Account", "j-account", "{\"id\": 1}\n{\"id\": 2}\n").await;
    mount_job(&server, "Contact", "j-contact", "{\"id\": 3}\n").await;

    let (mut records, error) = read_all(&definition(&server, ""), &fast()).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    records.sort_by_key(|r| r["id"].as_i64());
    assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
}

#[tokio::test]
async fn test_bulk_export_sends_rendered_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(wiremock::matchers::header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j1"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_job(&server, "Account", "j1", "{\"id\": 1}\n").await;

    let yaml = definition(&server, "").replace("values: [Account, Contact]", "values: [Account]");
    let (records, error) = read_all(&yaml, &fast()).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert_eq!(records, vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_failed_job_is_replaced() {
    let server = MockServer::start().await;
    // First attempt fails on the API side
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j-failed"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j-failed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "Failed"})))
        .mount(&server)
        .await;
    mount_job(&server, "Account", "j-ok", "{\"id\": 1}\n").await;

    let yaml = definition(&server, "jobs:\n  job_max_retry: 2\n")
        .replace("values: [Account, Contact]", "values: [Account]");
    let (records, error) = read_all(&yaml, &fast()).await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert_eq!(records, vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_exhausted_retries_end_with_incomplete_run() {
    let server = MockServer::start().await;
    for job_id in ["j-bad-1", "j-bad-2"] {
        Mock::given(method("POST"))
            .and(path("/jobs"))
            .and(body_json(json!({"object": "Account"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": job_id})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/jobs/{job_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "Failed"})))
            .mount(&server)
            .await;
    }
    mount_job(&server, "Contact", "j-contact", "{\"id\": 3}\n").await;

    let yaml = definition(&server, "jobs:\n  job_max_retry: 2\n");
    let (records, error) = read_all(&yaml, &fast()).await;

    // The healthy slice is still delivered before the run fails
    assert_eq!(records, vec![json!({"id": 3})]);
    match error {
        Some(Error::IncompleteRun { errors }) => assert!(!errors.is_empty()),
        other => panic!("expected an incomplete run, got {other:?}"),
    }
}

#[tokio::test]
async fn test_breaking_error_stops_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "j1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "Mystery"})))
        .mount(&server)
        .await;

    let yaml = definition(
        &server,
        "jobs:\n  exceptions_to_break_on: [unmapped_job_status]\n",
    );
    let (records, error) = read_all(&yaml, &fast()).await;

    assert!(records.is_empty());
    assert!(
        matches!(error, Some(Error::UnmappedJobStatus { ref status }) if status == "Mystery"),
        "unexpected error: {error:?}"
    );
}

// ============================================================================
// CLI Tests
// ============================================================================

#[tokio::test]
async fn test_cli_test_read_prints_records() {
    let server = MockServer::start().await;
    mount_job(&server, "Account", "j-account", "{\"id\": 1}\n").await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(definition(&server, "").as_bytes()).unwrap();
    let definition_path = file.path().to_string_lossy().to_string();

    let cli = Cli::parse_from([
        "solidafy-bulk",
        "--definition",
        &definition_path,
        "--config-json",
        r#"{"api_key": "secret"}"#,
        "read",
        "--test-read",
        "1",
        "--polling-interval-secs",
        "0",
    ]);
    let mut out = Vec::new();
    Runner::new(cli).run_with_output(&mut out).await.unwrap();

    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "RECORD");
    assert_eq!(lines[0]["record"]["stream"], "accounts");
    assert_eq!(lines[0]["record"]["data"], json!({"id": 1}));
    assert_eq!(lines[1]["type"], "LOG");
}

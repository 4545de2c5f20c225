//! HTTP end-to-end tests for workstream-server.
// crates/workstream-server/tests/http_end_to_end.rs
// ============================================================================
// Module: HTTP End-to-End Tests
// Description: Gated operations over a loopback listener.
// Purpose: Validate routing, tenant isolation, and the status contract.
// Dependencies: workstream-server, workstream-config, reqwest, tokio, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use explicit asserts and unwraps for clarity."
)]

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use workstream_config::WorkstreamGateConfig;
use workstream_config::config_toml_example;
use workstream_core::OpsEventKind;
use workstream_core::ops::MemoryOpsSink;
use workstream_server::WorkstreamServer;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

struct Harness {
    dir: tempfile::TempDir,
    base: String,
    client: reqwest::Client,
    ops: Arc<MemoryOpsSink>,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn error_category(&self, response: reqwest::Response) -> String {
        let body: Value = response.json().await.unwrap();
        body["error"]["category"].as_str().unwrap().to_string()
    }

    async fn audit_entries(&self, workstream: &str) -> Vec<Value> {
        let response = self.client.get(self.url(&format!("/api/workstream/{workstream}/audit"))).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["entries"].as_array().unwrap().clone()
    }
}

async fn start() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let toml = config_toml_example().replace("/var/lib/workstream-gate", dir.path().to_str().unwrap());
    let config = WorkstreamGateConfig::from_toml_str(&toml).unwrap();
    let ops = Arc::new(MemoryOpsSink::new());
    let server = WorkstreamServer::with_ops_sink(config, ops.clone()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(server.serve_with_listener(listener));
    Harness {
        dir,
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        ops,
    }
}

// ============================================================================
// SECTION: Ungated Routes
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn health_and_listing_are_ungated() {
    let harness = start().await;
    let health = harness.client.get(harness.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let listing: Value =
        harness.client.get(harness.url("/api/workstreams")).send().await.unwrap().json().await.unwrap();
    let names: Vec<&str> =
        listing["workstreams"].as_array().unwrap().iter().map(|entry| entry["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["mecca", "ora", "sales"]);
    assert!(listing["workstreams"][0].get("data_path").is_none());
    assert!(harness.ops.kinds().contains(&OpsEventKind::ServerStarted));
}

#[tokio::test(flavor = "multi_thread")]
async fn describe_hides_the_storage_root() {
    let harness = start().await;
    let response = harness.client.get(harness.url("/api/workstream/mecca")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "mecca");
    assert_eq!(body["status"], "planning");
    assert!(body.get("data_path").is_none());
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn ora_creates_and_deletes_an_artefact() {
    let harness = start().await;
    let url = harness.url("/api/workstream/ora/artefacts/tasks/1.json");
    let created = harness.client.post(&url).body(r#"{"title":"draft"}"#).send().await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let read = harness.client.get(&url).send().await.unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    assert_eq!(read.bytes().await.unwrap().as_ref(), br#"{"title":"draft"}"#);

    let deleted = harness.client.delete(&url).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let missing = harness.client.get(&url).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(harness.error_category(missing).await, "not_found");

    let on_disk = harness.dir.path().join("workstreams/ora/artefacts/tasks/1.json");
    assert!(!on_disk.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn mecca_delete_is_forbidden_and_unaudited() {
    let harness = start().await;
    let response =
        harness.client.delete(harness.url("/api/workstream/mecca/artefacts/tasks/1.json")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": { "category": "permission_denied", "message": "access denied to workstream" } }));
    assert!(harness.audit_entries("mecca").await.is_empty());
    assert!(harness.ops.kinds().contains(&OpsEventKind::GateRejected));
}

#[tokio::test(flavor = "multi_thread")]
async fn request_without_workstream_is_rejected() {
    let harness = start().await;
    let response = harness
        .client
        .post(harness.url("/api/admin/workstreams"))
        .json(&json!({ "name": "finance", "allowed_operations": ["read"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(response).await, "missing_workstream");
}

#[tokio::test(flavor = "multi_thread")]
async fn traversal_candidates_are_malformed() {
    let harness = start().await;
    let header = harness
        .client
        .post(harness.url("/api/admin/workstreams"))
        .header("x-workstream", "../../../etc/passwd")
        .json(&json!({ "name": "finance", "allowed_operations": ["read"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(header.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(header).await, "invalid_workstream_format");

    let path = harness.client.get(harness.url("/api/workstream/..%2F..%2Fetc")).send().await.unwrap();
    assert_eq!(path.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(path).await, "invalid_workstream_format");
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_log_recovers_on_next_append() {
    let harness = start().await;
    let log = harness.dir.path().join("workstreams/sales/logs/audit-log.json");
    std::fs::create_dir_all(log.parent().unwrap()).unwrap();
    std::fs::write(&log, b"{ truncated").unwrap();

    let response = harness
        .client
        .post(harness.url("/api/workstream/sales/chat"))
        .header("x-actor", "ora")
        .header("x-audit-source", "chat")
        .json(&json!({ "message": "pipeline review booked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let entries = harness.audit_entries("sales").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["actor"], "ora");
    assert_eq!(entries[0]["source"], "chat");
    assert_eq!(entries[0]["detail"]["kind"], "note");
    assert!(harness.ops.kinds().contains(&OpsEventKind::ReadCorruption));
}

// ============================================================================
// SECTION: Isolation & Status Contract
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn unknown_workstream_is_not_found() {
    let harness = start().await;
    let response = harness.client.get(harness.url("/api/workstream/ghost")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(harness.error_category(response).await, "unknown_workstream");
}

#[tokio::test(flavor = "multi_thread")]
async fn artefact_traversal_is_rejected_without_leaking_paths() {
    let harness = start().await;
    let response = harness
        .client
        .get(harness.url("/api/workstream/ora/artefacts/..%2F..%2Fsales%2Fartefacts%2Fsecret.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["category"], "invalid_resource_path");
    assert!(!body.to_string().contains(harness.dir.path().to_str().unwrap()));

    let ora = harness.audit_entries("ora").await;
    assert_eq!(ora.len(), 1);
    assert_eq!(ora[0]["message"], "artefact.read failed: invalid_resource_path");
    assert!(!Value::Array(ora).to_string().contains("secret.txt"));
    assert!(harness.audit_entries("sales").await.is_empty());
    for event in harness.ops.events() {
        assert!(!serde_json::to_string(&event).unwrap().contains("secret.txt"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn paths_that_normalize_to_nothing_are_malformed() {
    let harness = start().await;
    let url = harness.url("/api/workstream/ora/artefacts/tasks%2F..");
    let response = harness.client.put(url).body("x").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(response).await, "invalid_resource_path");
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_workstream_header_is_malformed() {
    let harness = start().await;
    let value = reqwest::header::HeaderValue::from_bytes(b"sal\xffes").unwrap();
    let url = harness.url("/api/workstream/ora/audit");
    let response = harness.client.get(url).header("x-workstream", value).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(response).await, "invalid_workstream_format");
}

#[tokio::test(flavor = "multi_thread")]
async fn strict_create_refuses_to_overwrite() {
    let harness = start().await;
    let url = harness.url("/api/workstream/sales/artefacts/plan.md");
    let first = harness.client.post(&url).body("v1").send().await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = harness.client.post(&url).body("v2").send().await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(second).await, "invalid_request");

    let replaced = harness.client.put(&url).body("v3").send().await.unwrap();
    assert_eq!(replaced.status(), StatusCode::OK);
    let read = harness.client.get(&url).send().await.unwrap();
    assert_eq!(read.bytes().await.unwrap().as_ref(), b"v3");
}

#[tokio::test(flavor = "multi_thread")]
async fn query_channel_outranks_the_path() {
    let harness = start().await;
    let url = harness.url("/api/workstream/sales/artefacts/shared.md?workstream=ora");
    let created = harness.client.post(&url).body("ora only").send().await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert!(harness.dir.path().join("workstreams/ora/artefacts/shared.md").exists());
    assert!(!harness.dir.path().join("workstreams/sales/artefacts/shared.md").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn appended_entries_are_not_duplicated() {
    let harness = start().await;
    let response = harness
        .client
        .post(harness.url("/api/workstream/ora/audit"))
        .json(&json!({ "message": "manual review", "tags": ["review"], "extra": { "ticket": "OPS-12" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert!(body["id"].is_string());

    let entries = harness.audit_entries("ora").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message"], "manual review");
    assert_eq!(entries[0]["extra"]["ticket"], "OPS-12");
    assert!(harness.audit_entries("sales").await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn audit_limit_must_be_numeric() {
    let harness = start().await;
    let response = harness.client.get(harness.url("/api/workstream/ora/audit?limit=all")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.error_category(response).await, "invalid_request");
}

// ============================================================================
// SECTION: Administration
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn admin_create_registers_an_isolated_workstream() {
    let harness = start().await;
    let create = || {
        harness
            .client
            .post(harness.url("/api/admin/workstreams?workstream=ora"))
            .json(&json!({ "name": "finance", "display_name": "Finance", "allowed_operations": ["read", "write"] }))
    };
    let response = create().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let described = harness.client.get(harness.url("/api/workstream/finance")).send().await.unwrap();
    assert_eq!(described.status(), StatusCode::OK);
    let duplicate = create().send().await.unwrap();
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(harness.error_category(duplicate).await, "registry_validation");

    let registry = std::fs::read_to_string(harness.dir.path().join("registry.json")).unwrap();
    assert!(registry.contains("finance"));
    let ora_entries = harness.audit_entries("ora").await;
    assert!(ora_entries.iter().any(|entry| entry["message"] == "workstream created"));
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_routes_require_admin_and_valid_names() {
    let harness = start().await;
    let denied = harness
        .client
        .post(harness.url("/api/admin/workstreams"))
        .header("x-workstream", "mecca")
        .json(&json!({ "name": "finance", "allowed_operations": ["read"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let invalid = harness
        .client
        .post(harness.url("/api/admin/workstreams?workstream=ora"))
        .json(&json!({ "name": "Bad Name", "allowed_operations": ["read"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let archived = harness
        .client
        .post(harness.url("/api/admin/workstreams/sales/archive?workstream=ora"))
        .send()
        .await
        .unwrap();
    assert_eq!(archived.status(), StatusCode::OK);
    let body: Value = archived.json().await.unwrap();
    assert_eq!(body["status"], "archived");

    let missing = harness
        .client
        .post(harness.url("/api/admin/workstreams/ghost/archive?workstream=ora"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
